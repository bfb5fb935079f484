//! The reconstruction engine and its `Idle -> Running -> Complete` lifecycle.

use crate::acquisition::{Acquisition, UltrasoundSignals, Volume};
use crate::config::{ReconSettings, Transducer};
use crate::engine::backend::Backend;
use crate::engine::pipeline::{ReconOutput, ReconPipeline};
use crate::prelude::{SaftError, SaftResult, StageConfig};
use crate::processing::{SensitivityField, UniformSensitivity, WorkerPool};
use crate::telemetry::{LogManager, ProgressTracker};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};

/// Interval between progress reports while waiting on a run.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type RunOutcome = (SaftResult<ReconOutput>, Duration);

/// Written once by the reconstruction task, readable by observers without
/// collecting the task.
type OutcomeSlot = Arc<OnceLock<RunOutcome>>;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Running,
    Complete,
}

enum EngineState {
    Idle { input: Option<Acquisition> },
    Running {
        started: Instant,
        handle: JoinHandle<()>,
        outcome: OutcomeSlot,
    },
    Complete { output: ReconOutput },
}

/// SAFT reconstruction engine.
///
/// The engine owns its input, configuration and result. `launch` hands the
/// input to a background task and returns at once. The task publishes its
/// result as soon as it ends, so `status`, `volume` and the other observers
/// see a finished run without a call to `wait` or `poll`.
pub struct Saft {
    transducer: Transducer,
    settings: ReconSettings,
    sensitivity: Arc<dyn SensitivityField>,
    workers: usize,
    state: EngineState,
    progress: Arc<ProgressTracker>,
    recon_time: Duration,
    last_error: Option<SaftError>,
    runtime: Option<Runtime>,
    logger: LogManager,
}

impl Saft {
    pub const NAME: &'static str = "saft::engine";

    pub fn new() -> Self {
        Self::with_logger(LogManager::new(Self::NAME))
    }

    pub fn with_logger(logger: LogManager) -> Self {
        let workers = WorkerPool::available_parallelism();
        logger.record(&format!("Found {} processor units for reconstruction", workers));
        Self {
            transducer: Transducer::default(),
            settings: ReconSettings::default(),
            sensitivity: Arc::new(UniformSensitivity),
            workers,
            state: EngineState::Idle { input: None },
            progress: Arc::new(ProgressTracker::new()),
            recon_time: Duration::ZERO,
            last_error: None,
            runtime: None,
            logger,
        }
    }

    pub fn transducer(&self) -> &Transducer {
        &self.transducer
    }

    /// Edits take effect at the next `launch`.
    pub fn transducer_mut(&mut self) -> &mut Transducer {
        &mut self.transducer
    }

    pub fn settings(&self) -> &ReconSettings {
        &self.settings
    }

    /// Edits take effect at the next `launch`.
    pub fn settings_mut(&mut self) -> &mut ReconSettings {
        &mut self.settings
    }

    pub fn set_sensitivity_field<F>(&mut self, field: F)
    where
        F: SensitivityField + 'static,
    {
        self.sensitivity = Arc::new(field);
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn set_workers(&mut self, workers: usize) -> SaftResult<()> {
        if workers == 0 {
            return Err(SaftError::InvalidArgument(
                "at least one worker is required".into(),
            ));
        }
        self.workers = workers;
        Ok(())
    }

    /// Takes ownership of a signal ensemble, replacing any previous input or result.
    pub fn set_input(&mut self, signals: UltrasoundSignals) -> SaftResult<()> {
        self.replace_input(Acquisition::Signals(signals))
    }

    /// Takes ownership of a volumetric time series with axes (t, x, y).
    pub fn set_input_volume(&mut self, volume: Volume) -> SaftResult<()> {
        self.replace_input(Acquisition::Volume(volume))
    }

    fn replace_input(&mut self, input: Acquisition) -> SaftResult<()> {
        let _ = self.collect_finished();
        if matches!(self.state, EngineState::Running { .. }) {
            return Err(SaftError::NotReady(
                "cannot replace the input while a reconstruction is running".into(),
            ));
        }
        self.logger.debug(&format!(
            "Received input with {} traces",
            input.trace_count()
        ));
        self.state = EngineState::Idle { input: Some(input) };
        self.progress = Arc::new(ProgressTracker::new());
        self.last_error = None;
        Ok(())
    }

    /// Validates the configuration against the current input and starts the
    /// reconstruction in the background. On error the engine stays `Idle` and
    /// keeps its input.
    pub fn launch(&mut self) -> SaftResult<()> {
        // a failure of the previous run stays available through `last_error`
        let _ = self.collect_finished();
        let input = match std::mem::replace(&mut self.state, EngineState::Idle { input: None }) {
            EngineState::Idle { input: Some(input) } => input,
            EngineState::Running {
                started,
                handle,
                outcome,
            } => {
                self.state = EngineState::Running {
                    started,
                    handle,
                    outcome,
                };
                return Err(SaftError::NotReady(
                    "a reconstruction is already running".into(),
                ));
            }
            other => {
                self.state = other;
                self.logger.warn("No data available for reconstruction!");
                return Err(SaftError::NotReady("no input data set".into()));
            }
        };

        let pipeline = match self.prepare(&input) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.state = EngineState::Idle { input: Some(input) };
                return Err(err);
            }
        };
        let Some(runtime) = self.runtime.as_ref() else {
            self.state = EngineState::Idle { input: Some(input) };
            return Err(SaftError::Internal("reconstruction runtime missing".into()));
        };

        let progress = Arc::clone(&self.progress);
        progress.start();
        let started = Instant::now();
        let outcome: OutcomeSlot = Arc::new(OnceLock::new());
        let published = Arc::clone(&outcome);
        let handle = runtime.spawn_blocking(move || {
            let result = pipeline.run(input);
            let succeeded = result.is_ok();
            let _ = published.set((result, started.elapsed()));
            // the outcome is visible before the running flag drops
            if succeeded {
                progress.finish();
            } else {
                progress.abort();
            }
        });

        self.last_error = None;
        self.state = EngineState::Running {
            started,
            handle,
            outcome,
        };
        Ok(())
    }

    fn prepare(&mut self, input: &Acquisition) -> SaftResult<ReconPipeline> {
        if input.is_empty() {
            self.logger.warn("No data available for reconstruction!");
            return Err(SaftError::NotReady("input contains no samples".into()));
        }

        let backend = Backend::select(&self.settings)?;
        self.transducer.validate()?;
        self.settings.validate()?;
        self.settings.sort_cropping();

        let pool = WorkerPool::with_workers(self.workers)?;
        self.progress = Arc::new(ProgressTracker::new());
        let config = StageConfig {
            settings: self.settings.clone(),
            transducer: self.transducer,
        };
        let pipeline = ReconPipeline::new(
            config,
            Arc::clone(&self.sensitivity),
            pool,
            Arc::clone(&self.progress),
            self.logger,
        )?;
        pipeline.plan(input)?;
        self.ensure_runtime()?;

        self.logger.record(&format!(
            "Launching reconstruction of {} traces on {} with {} workers",
            input.trace_count(),
            backend.name(),
            self.workers
        ));
        Ok(pipeline)
    }

    fn ensure_runtime(&mut self) -> SaftResult<()> {
        if self.runtime.is_none() {
            let runtime = Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("saft-recon")
                .enable_time()
                .build()
                .map_err(|err| SaftError::Internal(format!("creating runtime: {}", err)))?;
            self.runtime = Some(runtime);
        }
        Ok(())
    }

    /// Blocks until the running reconstruction ends and returns its outcome.
    /// Returns at once when nothing is running.
    ///
    /// Blocking would stall an async executor, so inside a tokio runtime this
    /// returns `NotReady` and leaves the run untouched; use `poll` there.
    pub fn wait(&mut self) -> SaftResult<()> {
        if !matches!(self.state, EngineState::Running { .. }) {
            return Ok(());
        }
        if Handle::try_current().is_ok() {
            return Err(SaftError::NotReady(
                "wait blocks the caller; use poll inside an async context".into(),
            ));
        }
        let (started, mut handle, outcome) =
            match std::mem::replace(&mut self.state, EngineState::Idle { input: None }) {
                EngineState::Running {
                    started,
                    handle,
                    outcome,
                } => (started, handle, outcome),
                other => {
                    self.state = other;
                    return Ok(());
                }
            };

        let Some(runtime) = self.runtime.as_ref() else {
            handle.abort();
            self.progress.abort();
            return Err(SaftError::Internal("reconstruction runtime missing".into()));
        };
        let progress = Arc::clone(&self.progress);
        let logger = self.logger;
        let joined = runtime.block_on(async {
            loop {
                match tokio::time::timeout(POLL_INTERVAL, &mut handle).await {
                    Ok(joined) => break joined,
                    Err(_) => logger.record(&format!(
                        "Reconstruction status at {:.1}%",
                        progress.percent()
                    )),
                }
            }
        });
        self.finalize(joined, outcome, started)
    }

    /// Non-blocking observation; collects the result of a run that has ended.
    pub fn poll(&mut self) -> SaftResult<EngineStatus> {
        self.collect_finished()?;
        Ok(self.status())
    }

    /// Moves the outcome of an ended run into the engine state.
    fn collect_finished(&mut self) -> SaftResult<()> {
        // inside an async context the task cannot be joined, only observed
        let in_async = Handle::try_current().is_ok();
        let finished = match &self.state {
            EngineState::Running {
                handle, outcome, ..
            } => handle.is_finished() || (!in_async && outcome.get().is_some()),
            _ => false,
        };
        if !finished {
            return Ok(());
        }
        let (started, handle, outcome) =
            match std::mem::replace(&mut self.state, EngineState::Idle { input: None }) {
                EngineState::Running {
                    started,
                    handle,
                    outcome,
                } => (started, handle, outcome),
                other => {
                    self.state = other;
                    return Ok(());
                }
            };
        // the task has published, so joining only waits for it to return
        let joined = match self.runtime.as_ref() {
            Some(runtime) if !in_async => runtime.block_on(handle),
            _ => Ok(()),
        };
        self.finalize(joined, outcome, started)
    }

    /// Lifecycle state as seen by observers. A run whose task has published
    /// its outcome reads `Complete`, or `Idle` when it failed.
    pub fn status(&self) -> EngineStatus {
        match &self.state {
            EngineState::Idle { .. } => EngineStatus::Idle,
            EngineState::Running { outcome, .. } => match outcome.get() {
                None => EngineStatus::Running,
                Some((Ok(_), _)) => EngineStatus::Complete,
                Some((Err(_), _)) => EngineStatus::Idle,
            },
            EngineState::Complete { .. } => EngineStatus::Complete,
        }
    }

    fn published(&self) -> Option<&RunOutcome> {
        match &self.state {
            EngineState::Running { outcome, .. } => outcome.get(),
            _ => None,
        }
    }

    fn output(&self) -> Option<&ReconOutput> {
        match &self.state {
            EngineState::Complete { output } => Some(output),
            _ => self.published().and_then(|(result, _)| result.as_ref().ok()),
        }
    }

    fn finalize(
        &mut self,
        joined: Result<(), JoinError>,
        outcome: OutcomeSlot,
        started: Instant,
    ) -> SaftResult<()> {
        let published = Arc::try_unwrap(outcome)
            .ok()
            .and_then(OnceLock::into_inner);
        let (result, elapsed) = match (joined, published) {
            (_, Some(outcome)) => outcome,
            (Err(err), None) => {
                self.progress.abort();
                (
                    Err(SaftError::Internal(format!("reconstruction task failed: {}", err))),
                    started.elapsed(),
                )
            }
            (Ok(()), None) => {
                self.progress.abort();
                (
                    Err(SaftError::Internal(
                        "reconstruction task ended without a result".into(),
                    )),
                    started.elapsed(),
                )
            }
        };
        self.recon_time = elapsed;

        match result {
            Ok(output) => {
                self.logger.record(&format!(
                    "Reconstruction finished after {:.3} seconds",
                    elapsed.as_secs_f64()
                ));
                self.state = EngineState::Complete { output };
                Ok(())
            }
            Err(err) => {
                self.logger.warn(&format!("Reconstruction failed: {}", err));
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.progress.is_running()
    }

    /// Progress of the current or last run in percent.
    pub fn perc_done(&self) -> f32 {
        self.progress.percent()
    }

    /// Wall-clock duration of the last finished run in seconds.
    pub fn recon_time(&self) -> f64 {
        match self.published() {
            Some((_, elapsed)) => elapsed.as_secs_f64(),
            None => self.recon_time.as_secs_f64(),
        }
    }

    /// Remaining seconds extrapolated from the progress so far; `None` while
    /// no estimate exists.
    pub fn t_remain(&self) -> Option<f64> {
        match &self.state {
            EngineState::Running {
                started, outcome, ..
            } => match outcome.get() {
                Some((Ok(_), _)) => Some(0.0),
                Some((Err(_), _)) => None,
                None => {
                    let percent = self.progress.percent() as f64;
                    if percent <= 0.0 {
                        return None;
                    }
                    let elapsed = started.elapsed().as_secs_f64();
                    Some(elapsed * (100.0 - percent) / percent)
                }
            },
            EngineState::Complete { .. } => Some(0.0),
            EngineState::Idle { .. } => None,
        }
    }

    /// Error of the last failed run, cleared by the next input or launch.
    pub fn last_error(&self) -> Option<&SaftError> {
        match self.published() {
            Some((Err(err), _)) => Some(err),
            _ => self.last_error.as_ref(),
        }
    }

    pub fn volume(&self) -> SaftResult<&Volume> {
        match self.output() {
            Some(output) => Ok(&output.volume),
            None => {
                self.logger.warn("No volume data available");
                Err(SaftError::NotReady("no reconstructed volume".into()))
            }
        }
    }

    /// The DC-corrected and cropped ensemble the completed run beamformed.
    pub fn preprocessed(&self) -> SaftResult<&UltrasoundSignals> {
        self.output()
            .map(|output| &output.signals)
            .ok_or_else(|| SaftError::NotReady("no completed reconstruction".into()))
    }
}

impl Default for Saft {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{Grid, TimeSignal, TimeSignalProperties};
    use crate::math::{Float3, Size3};
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn engine() -> Saft {
        let mut saft = Saft::with_logger(LogManager::silent(Saft::NAME));
        saft.set_workers(2).unwrap();
        saft
    }

    /// 8 traces of 100 samples on a 4 x 2 raster, each with its own offset.
    fn offset_ensemble() -> UltrasoundSignals {
        (0..8)
            .map(|k| {
                let props = TimeSignalProperties {
                    sample_rate: 50e6,
                    delta_t: 0.0,
                    pos: Float3::new([(k % 4) as f32 * 1e-4, (k / 4) as f32 * 1e-4, 0.0]),
                };
                let offset = 0.5 + k as f32 * 1.25;
                let samples = (0..100)
                    .map(|i| offset + (i as f32 * 0.3).sin())
                    .collect();
                TimeSignal::from_samples(samples, props).unwrap()
            })
            .collect()
    }

    #[test]
    fn launch_without_input_is_not_ready() {
        let mut saft = engine();
        assert!(matches!(saft.launch(), Err(SaftError::NotReady(_))));
        assert_eq!(saft.status(), EngineStatus::Idle);
        assert!(!saft.is_running());
        assert!(matches!(saft.volume(), Err(SaftError::NotReady(_))));
    }

    #[test]
    fn wait_returns_immediately_when_idle() {
        let mut saft = engine();
        saft.wait().unwrap();
        saft.set_input(offset_ensemble()).unwrap();
        saft.wait().unwrap();
        assert_eq!(saft.status(), EngineStatus::Idle);
        assert_eq!(saft.t_remain(), None);
    }

    #[test]
    fn empty_ensemble_stays_idle() {
        let mut saft = engine();
        saft.set_input(UltrasoundSignals::new()).unwrap();
        assert!(matches!(saft.launch(), Err(SaftError::NotReady(_))));
        assert_eq!(saft.status(), EngineStatus::Idle);
    }

    #[test]
    fn gpu_request_is_rejected_before_launch() {
        let mut saft = engine();
        saft.set_input(offset_ensemble()).unwrap();
        saft.settings_mut().set_use_gpu(true);
        assert!(matches!(
            saft.launch(),
            Err(SaftError::BackendUnavailable(_))
        ));
        assert_eq!(saft.status(), EngineStatus::Idle);

        saft.settings_mut().set_use_gpu(false);
        saft.launch().unwrap();
        saft.wait().unwrap();
        assert_eq!(saft.status(), EngineStatus::Complete);
    }

    #[test]
    fn full_lifecycle_removes_dc_and_reconstructs() {
        let mut saft = engine();
        saft.set_input(offset_ensemble()).unwrap();
        saft.launch().unwrap();
        saft.wait().unwrap();

        assert!(!saft.is_running());
        assert_eq!(saft.perc_done(), 100.0);
        assert!(saft.recon_time() >= 0.0);
        assert_eq!(saft.t_remain(), Some(0.0));
        assert_eq!(saft.poll().unwrap(), EngineStatus::Complete);

        let preprocessed = saft.preprocessed().unwrap();
        assert_eq!(preprocessed.len(), 8);
        for signal in preprocessed {
            assert_abs_diff_eq!(signal.mean(), 0.0, epsilon = 1e-4);
        }

        let volume = saft.volume().unwrap();
        assert_eq!(volume.dims(), Size3::new([4, 2, 100]));
        assert!(volume.iter().all(|v| v.is_finite()));
        assert!(volume.iter().any(|&v| v != 0.0));

        // the run consumed its input
        assert!(matches!(saft.launch(), Err(SaftError::NotReady(_))));
        saft.set_input(offset_ensemble()).unwrap();
        assert_eq!(saft.status(), EngineStatus::Idle);
        assert!(saft.volume().is_err());
    }

    #[test]
    fn running_engine_rejects_new_input() {
        let gate = Arc::new(AtomicBool::new(false));
        let released = Arc::clone(&gate);

        let mut saft = engine();
        saft.settings_mut().set_sensitivity_weighting(true);
        saft.set_sensitivity_field(move |_voxel: Float3| {
            while !released.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            1.0f32
        });
        saft.set_input(offset_ensemble()).unwrap();
        saft.launch().unwrap();

        assert!(saft.is_running());
        assert_eq!(saft.status(), EngineStatus::Running);
        assert!(matches!(
            saft.set_input(offset_ensemble()),
            Err(SaftError::NotReady(_))
        ));
        assert!(matches!(saft.launch(), Err(SaftError::NotReady(_))));
        assert!(saft.volume().is_err());

        gate.store(true, Ordering::SeqCst);
        saft.wait().unwrap();
        assert!(!saft.is_running());
        assert_eq!(saft.status(), EngineStatus::Complete);
    }

    #[test]
    fn finished_run_is_observable_without_waiting() {
        let mut saft = engine();
        saft.set_input(offset_ensemble()).unwrap();
        saft.launch().unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        while saft.is_running() {
            assert!(Instant::now() < deadline, "reconstruction did not finish");
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(saft.perc_done(), 100.0);
        assert_eq!(saft.status(), EngineStatus::Complete);
        assert_eq!(saft.t_remain(), Some(0.0));
        assert!(saft.last_error().is_none());
        assert_eq!(saft.volume().unwrap().dims(), Size3::new([4, 2, 100]));
        assert_eq!(saft.preprocessed().unwrap().len(), 8);

        saft.wait().unwrap();
        assert_eq!(saft.status(), EngineStatus::Complete);
        assert!(saft.volume().is_ok());
    }

    #[test]
    fn wait_inside_async_context_defers_to_poll() {
        let mut saft = engine();
        saft.set_input(offset_ensemble()).unwrap();
        saft.launch().unwrap();

        let shell = Builder::new_current_thread().build().unwrap();
        let status = shell.block_on(async {
            assert!(matches!(saft.wait(), Err(SaftError::NotReady(_))));
            let deadline = Instant::now() + Duration::from_secs(30);
            loop {
                let status = saft.poll().unwrap();
                if status != EngineStatus::Running {
                    break status;
                }
                assert!(Instant::now() < deadline, "reconstruction did not finish");
                thread::sleep(Duration::from_millis(1));
            }
        });

        assert_eq!(status, EngineStatus::Complete);
        assert_eq!(saft.volume().unwrap().dims(), Size3::new([4, 2, 100]));
    }

    #[test]
    fn crop_misses_are_reported_before_running() {
        let mut saft = engine();
        saft.set_input(offset_ensemble()).unwrap();
        saft.settings_mut().set_crop_x(1.0, 2.0).unwrap();
        assert!(matches!(saft.launch(), Err(SaftError::InvalidRange(_))));
        assert_eq!(saft.status(), EngineStatus::Idle);

        // input kept, so fixing the window is enough to relaunch
        saft.settings_mut().set_crop_t(0.0, 1.0).unwrap();
        saft.settings_mut().set_crop_x(1e-4, 2e-4).unwrap();
        saft.settings_mut().set_crop_y(0.0, 0.0).unwrap();
        saft.launch().unwrap();
        saft.wait().unwrap();

        assert_eq!(saft.preprocessed().unwrap().len(), 2);
        assert_eq!(saft.volume().unwrap().dims(), Size3::new([2, 1, 100]));
    }

    #[test]
    fn inverted_crop_bounds_are_sorted_at_launch() {
        let mut saft = engine();
        saft.set_input(offset_ensemble()).unwrap();
        saft.settings_mut().set_crop_t(1.0, 0.0).unwrap();
        saft.settings_mut().set_crop_x(3e-4, 0.0).unwrap();
        saft.settings_mut().set_crop_y(1e-4, 0.0).unwrap();
        saft.launch().unwrap();
        saft.wait().unwrap();

        assert_eq!(
            saft.settings().crop_bounds(crate::config::CropAxis::X),
            (0.0, 3e-4)
        );
        assert_eq!(saft.preprocessed().unwrap().len(), 8);
    }

    #[test]
    fn volumetric_input_is_reconstructed() {
        let grid = Grid {
            dims: Size3::new([50, 3, 2]),
            res: Float3::new([1.0 / 50e6, 1e-4, 1e-4]),
            center: Float3::new([25.0 / 50e6, 1e-4, 0.5e-4]),
        };
        let mut volume = Volume::with_grid(grid);
        for y in 0..2 {
            for x in 0..3 {
                for t in 0..50 {
                    volume[(t, x, y)] = 4.0 + (x + y) as f32 + (t as f32 * 0.5).cos();
                }
            }
        }

        let mut saft = engine();
        saft.settings_mut().set_coherence_weighting(false);
        saft.set_input_volume(volume).unwrap();
        saft.launch().unwrap();
        saft.wait().unwrap();

        for signal in saft.preprocessed().unwrap() {
            assert_abs_diff_eq!(signal.mean(), 0.0, epsilon = 1e-4);
        }
        assert_eq!(saft.volume().unwrap().dims(), Size3::new([3, 2, 50]));
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut saft = engine();
        assert!(matches!(
            saft.set_workers(0),
            Err(SaftError::InvalidArgument(_))
        ));
        assert_eq!(saft.workers(), 2);
    }
}

//! Per-voxel delay-and-sum beamforming.
//!
//! Every voxel collects, over all scan positions inside the transducer's
//! acceptance cone, the trace sample at the acoustic time of flight between
//! the voxel and the position. Voxels are independent, so the flattened voxel
//! space is split into one contiguous chunk per worker.

use crate::acquisition::{Grid, TimeSignal, UltrasoundSignals, Volume};
use crate::config::{ReconSettings, Transducer};
use crate::math::{FftHelper, Float3, Size3};
use crate::prelude::{SaftError, SaftResult, StageConfig};
use crate::processing::pool::WorkerPool;
use crate::processing::weighting::{CoherenceAccumulator, SensitivityField};
use crate::telemetry::{LogManager, ProgressTracker};
use num_complex::Complex32;
use rayon::prelude::*;
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

/// Voxels processed between two progress updates of a worker.
const PROGRESS_STRIDE: usize = 256;

/// Scan coordinates closer than this collapse onto one grid line [m].
const POSITION_TOLERANCE: f32 = 1e-7;

/// Decides which scan positions see a voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureCone {
    tan_theta: f32,
    tan_hole: f32,
    r_min: f32,
}

impl ApertureCone {
    pub fn new(transducer: &Transducer, r_min: f32) -> SaftResult<Self> {
        Ok(Self {
            tan_theta: cone_slope(transducer.theta()?),
            tan_hole: cone_slope(transducer.hole_theta()?),
            r_min,
        })
    }

    /// `lateral` is the voxel's distance from the transducer axis, `depth` its
    /// offset along it. Voxels behind the scan plane are never seen.
    pub fn accepts(&self, lateral: f32, depth: f32) -> bool {
        if depth < 0.0 {
            return false;
        }
        if lateral > cone_radius(self.tan_theta, depth).max(self.r_min) {
            return false;
        }
        // inside the r_min floor the hole does not apply
        lateral <= self.r_min || lateral >= cone_radius(self.tan_hole, depth)
    }
}

/// Slope of a cone with half-angle `theta`; a half-angle of 90 degrees or more
/// opens the cone completely.
fn cone_slope(theta: f32) -> f32 {
    if theta >= FRAC_PI_2 {
        f32::INFINITY
    } else {
        theta.tan()
    }
}

/// Cone radius at `depth`, finite at the apex even for an open cone.
fn cone_radius(slope: f32, depth: f32) -> f32 {
    if depth <= 0.0 {
        0.0
    } else {
        depth * slope
    }
}

/// Neighbouring sample indices and the weight of the upper one, or `None` when
/// `index` falls outside the trace.
fn interpolation(len: usize, index: f64) -> Option<(usize, usize, f32)> {
    if len == 0 || !index.is_finite() || index < 0.0 || index > (len - 1) as f64 {
        return None;
    }
    let i0 = index.floor() as usize;
    let i1 = (i0 + 1).min(len - 1);
    Some((i0, i1, (index - i0 as f64) as f32))
}

struct PreparedTrace<'a> {
    signal: &'a TimeSignal,
    analytic: Option<Vec<Complex32>>,
}

fn lateral_axis(mut values: Vec<f32>, fallback_res: f32) -> (usize, f32, f32) {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| (*a - *b).abs() <= POSITION_TOLERANCE);
    let first = values[0];
    let last = values[values.len() - 1];
    let res = if values.len() > 1 {
        (last - first) / (values.len() - 1) as f32
    } else {
        fallback_res
    };
    (values.len(), res, 0.5 * (first + last))
}

/// Derives the reconstruction grid from the scan geometry: lateral axes follow
/// the distinct scan coordinates, the depth axis spans the recorded time window
/// with one voxel per sample.
pub fn output_grid(signals: &UltrasoundSignals, settings: &ReconSettings) -> SaftResult<Grid> {
    let recorded: Vec<&TimeSignal> = signals.iter().filter(|s| !s.is_empty()).collect();
    if recorded.is_empty() {
        return Err(SaftError::NotReady("no samples to reconstruct".into()));
    }

    let sample_rate = recorded
        .iter()
        .map(|s| s.sample_rate())
        .fold(0.0f32, f32::max);
    let t_first = recorded
        .iter()
        .map(|s| s.delta_t())
        .fold(f32::INFINITY, f32::min);
    let t_last = recorded
        .iter()
        .map(|s| s.time_of(s.len() - 1))
        .fold(f32::NEG_INFINITY, f32::max);
    let z_scan = recorded
        .iter()
        .map(|s| s.pos()[2])
        .fold(f32::INFINITY, f32::min);

    let depth_per_second = settings.depth_per_second();
    let res_z = depth_per_second / sample_rate;
    let nz = ((t_last - t_first) * sample_rate).round().max(0.0) as usize + 1;
    let z_first = z_scan + t_first * depth_per_second;

    let (nx, res_x, center_x) =
        lateral_axis(recorded.iter().map(|s| s.pos()[0]).collect(), res_z);
    let (ny, res_y, center_y) =
        lateral_axis(recorded.iter().map(|s| s.pos()[1]).collect(), res_z);

    let grid = Grid {
        dims: Size3::new([nx, ny, nz]),
        res: Float3::new([res_x, res_y, res_z]),
        center: Float3::new([center_x, center_y, z_first + res_z * (nz - 1) as f32 * 0.5]),
    };
    if grid.res.iter().any(|&r| !r.is_finite() || r <= 0.0) {
        return Err(SaftError::InvalidArgument(format!(
            "derived voxel pitch {:?} is not positive",
            grid.res.as_array()
        )));
    }
    Ok(grid)
}

/// Delay-and-sum kernel configured for one run.
pub struct Beamformer {
    cone: ApertureCone,
    sos: f64,
    /// 2 for round-trip pulse-echo, 1 for one-way optoacoustics
    path_factor: f64,
    coherence_weighting: bool,
    sensitivity_weighting: bool,
    field: Arc<dyn SensitivityField>,
    logger: LogManager,
}

impl Beamformer {
    pub const NAME: &'static str = "saft::beamform";

    pub fn new(
        config: &StageConfig,
        field: Arc<dyn SensitivityField>,
        logger: LogManager,
    ) -> SaftResult<Self> {
        let settings = &config.settings;
        settings.validate()?;
        Ok(Self {
            cone: ApertureCone::new(&config.transducer, settings.r_min())?,
            sos: settings.sos() as f64,
            path_factor: if settings.pulse_echo() { 2.0 } else { 1.0 },
            coherence_weighting: settings.coherence_weighting(),
            sensitivity_weighting: settings.sensitivity_weighting(),
            field,
            logger,
        })
    }

    fn prepare<'a>(&self, signals: &'a UltrasoundSignals) -> Vec<PreparedTrace<'a>> {
        if !self.coherence_weighting {
            return signals
                .iter()
                .map(|signal| PreparedTrace {
                    signal,
                    analytic: None,
                })
                .collect();
        }

        let mut helpers: HashMap<usize, FftHelper> = HashMap::new();
        for signal in signals.iter().filter(|s| !s.is_empty()) {
            helpers
                .entry(signal.len())
                .or_insert_with(|| FftHelper::new(signal.len()));
        }
        signals
            .as_slice()
            .par_iter()
            .map(|signal| PreparedTrace {
                signal,
                analytic: helpers
                    .get(&signal.len())
                    .map(|helper| helper.analytic(signal.samples())),
            })
            .collect()
    }

    fn voxel_value(&self, traces: &[PreparedTrace<'_>], pos: Float3) -> f32 {
        let mut sum = 0.0f64;
        let mut coherence = CoherenceAccumulator::default();

        for trace in traces {
            let signal = trace.signal;
            let offset = pos - signal.pos();
            let lateral = (offset[0] * offset[0] + offset[1] * offset[1]).sqrt();
            if !self.cone.accepts(lateral, offset[2]) {
                continue;
            }

            let tof = offset.norm() as f64 * self.path_factor / self.sos;
            let index = (tof - signal.delta_t() as f64) * signal.sample_rate() as f64;
            let Some((i0, i1, frac)) = interpolation(signal.len(), index) else {
                continue;
            };

            match &trace.analytic {
                Some(analytic) => {
                    let sample = analytic[i0] * (1.0 - frac) + analytic[i1] * frac;
                    sum += sample.re as f64;
                    coherence.push(sample);
                }
                None => {
                    let samples = signal.samples();
                    sum += (samples[i0] * (1.0 - frac) + samples[i1] * frac) as f64;
                }
            }
        }

        if self.coherence_weighting {
            sum *= coherence.factor();
        }
        if self.sensitivity_weighting {
            sum *= self.field.sensitivity(pos) as f64;
        }
        sum as f32
    }

    /// Reconstructs `grid` from `signals`, advancing `progress` by one unit per voxel.
    pub fn reconstruct(
        &self,
        signals: &UltrasoundSignals,
        grid: Grid,
        pool: &WorkerPool,
        progress: &ProgressTracker,
    ) -> SaftResult<Volume> {
        let traces = pool.install(|| self.prepare(signals));
        let mut volume = Volume::with_grid(grid);
        let total = volume.len();
        progress.set_total(total);

        let chunk_len = pool.chunk_len(total);
        self.logger.record(&format!(
            "Beamforming {} voxels from {} traces in chunks of {}",
            total,
            traces.len(),
            chunk_len
        ));

        let values = volume.as_slice_mut()?;
        pool.install(|| {
            values
                .par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(chunk, chunk_values)| {
                    let start = chunk * chunk_len;
                    let mut pending = 0;
                    for (offset, value) in chunk_values.iter_mut().enumerate() {
                        let pos = grid.position(grid.unravel(start + offset));
                        *value = self.voxel_value(&traces, pos);
                        pending += 1;
                        if pending == PROGRESS_STRIDE {
                            progress.advance(pending);
                            pending = 0;
                        }
                    }
                    progress.advance(pending);
                });
        });

        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::TimeSignalProperties;
    use crate::processing::weighting::UniformSensitivity;
    use approx::assert_abs_diff_eq;

    const SAMPLE_RATE: f32 = 50e6;
    const SOS: f32 = 1500.0;
    const PITCH: f32 = 1e-4;
    const SOURCE_DEPTH: f64 = 3e-3;

    /// Optoacoustic raster over a single point absorber on the axis of the
    /// central scan position.
    fn point_source_ensemble(delta_t: f32) -> UltrasoundSignals {
        let mut signals = UltrasoundSignals::new();
        for iy in 0..5 {
            for ix in 0..5 {
                let x = (ix as f32 - 2.0) * PITCH;
                let y = (iy as f32 - 2.0) * PITCH;
                let dist = ((x as f64).powi(2) + (y as f64).powi(2) + SOURCE_DEPTH.powi(2)).sqrt();
                let peak = (dist / SOS as f64 - delta_t as f64) * SAMPLE_RATE as f64;
                let samples = (0..200)
                    .map(|i| (-((i as f64 - peak) / 1.5).powi(2)).exp() as f32)
                    .collect();
                let props = TimeSignalProperties {
                    sample_rate: SAMPLE_RATE,
                    delta_t,
                    pos: Float3::new([x, y, 0.0]),
                };
                signals.push(TimeSignal::from_samples(samples, props).unwrap());
            }
        }
        signals
    }

    fn config(coherence: bool) -> StageConfig {
        let mut settings = ReconSettings::default();
        settings.set_sos(SOS).unwrap();
        settings.set_pulse_echo(false);
        settings.set_coherence_weighting(coherence);
        let mut transducer = Transducer::default();
        transducer.set_r_hole(0.0).unwrap();
        StageConfig {
            settings,
            transducer,
        }
    }

    #[test]
    fn cone_applies_aperture_hole_and_floor() {
        let transducer = Transducer::new(2.0, 1.0, 0.2).unwrap();
        let cone = ApertureCone::new(&transducer, 0.05).unwrap();
        // tan(30 deg) ~ 0.577, tan(asin(0.1)) ~ 0.1005
        assert!(cone.accepts(0.0, 1.0));
        assert!(cone.accepts(0.5, 1.0));
        assert!(!cone.accepts(0.6, 1.0));
        assert!(!cone.accepts(0.08, 1.0));
        assert!(cone.accepts(0.04, 0.01));
        assert!(!cone.accepts(0.06, 0.01));
    }

    #[test]
    fn aperture_at_focal_distance_opens_the_cone() {
        let transducer = Transducer::new(2.0, 2.0, 0.0).unwrap();
        let cone = ApertureCone::new(&transducer, 0.0).unwrap();
        assert!(cone.accepts(0.5, 1.0));
        assert!(cone.accepts(1e3, 1e-3));
        assert!(cone.accepts(0.0, 0.0));
        assert!(!cone.accepts(0.1, 0.0));

        // a hole as wide as the focal distance leaves only the r_min floor
        let transducer = Transducer::new(2.0, 2.0, 2.0).unwrap();
        let cone = ApertureCone::new(&transducer, 0.05).unwrap();
        assert!(cone.accepts(0.04, 1.0));
        assert!(!cone.accepts(0.5, 1.0));
    }

    #[test]
    fn voxels_behind_the_scan_plane_are_rejected() {
        let transducer = Transducer::new(2.0, 1.0, 0.0).unwrap();
        let cone = ApertureCone::new(&transducer, 0.05).unwrap();
        assert!(cone.accepts(0.3, 1.0));
        assert!(!cone.accepts(0.3, -1.0));
        assert!(!cone.accepts(0.0, -0.01));
    }

    #[test]
    fn interpolation_stays_inside_the_trace() {
        assert_eq!(interpolation(4, -0.1), None);
        assert_eq!(interpolation(4, 3.5), None);
        assert_eq!(interpolation(0, 0.0), None);
        assert_eq!(interpolation(4, 3.0), Some((3, 3, 0.0)));
        let (i0, i1, frac) = interpolation(4, 1.25).unwrap();
        assert_eq!((i0, i1), (1, 2));
        assert_abs_diff_eq!(frac, 0.25);
    }

    #[test]
    fn output_grid_follows_scan_raster_and_time_window() {
        let signals = point_source_ensemble(0.0);
        let grid = output_grid(&signals, &config(false).settings).unwrap();

        assert_eq!(grid.dims, Size3::new([5, 5, 200]));
        assert_abs_diff_eq!(grid.res[0], PITCH, epsilon = 1e-9);
        assert_abs_diff_eq!(grid.res[2], SOS / SAMPLE_RATE, epsilon = 1e-9);
        assert_abs_diff_eq!(grid.position_along(0, 2), 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(grid.position_along(2, 100), SOURCE_DEPTH as f32, epsilon = 1e-7);
    }

    #[test]
    fn pulse_echo_halves_the_depth_axis() {
        let signals = point_source_ensemble(0.0);
        let mut settings = config(false).settings;
        settings.set_pulse_echo(true);
        let grid = output_grid(&signals, &settings).unwrap();
        assert_abs_diff_eq!(grid.res[2], 0.5 * SOS / SAMPLE_RATE, epsilon = 1e-9);
    }

    #[test]
    fn point_source_focuses_on_its_voxel() {
        let signals = point_source_ensemble(0.0);
        let config = config(false);
        let grid = output_grid(&signals, &config.settings).unwrap();
        let beamformer = Beamformer::new(
            &config,
            Arc::new(UniformSensitivity),
            LogManager::silent(Beamformer::NAME),
        )
        .unwrap();
        let pool = WorkerPool::with_workers(3).unwrap();
        let progress = ProgressTracker::new();
        progress.start();

        let volume = beamformer
            .reconstruct(&signals, grid, &pool, &progress)
            .unwrap();
        let (idx, peak) = volume.argmax().unwrap();

        assert_eq!(idx, Size3::new([2, 2, 100]));
        // off-axis traces sample their pulse between two samples
        assert!(peak > 20.0 && peak <= 25.0, "peak {}", peak);
        assert_eq!(progress.percent(), 100.0);
    }

    #[test]
    fn acquisition_delay_shifts_the_depth_axis() {
        let delay = 1e-6;
        let signals = point_source_ensemble(delay);
        let config = config(false);
        let grid = output_grid(&signals, &config.settings).unwrap();
        assert_abs_diff_eq!(grid.position_along(2, 0), delay * SOS, epsilon = 1e-7);

        let beamformer = Beamformer::new(
            &config,
            Arc::new(UniformSensitivity),
            LogManager::silent(Beamformer::NAME),
        )
        .unwrap();
        let pool = WorkerPool::with_workers(2).unwrap();
        let volume = beamformer
            .reconstruct(&signals, grid, &pool, &ProgressTracker::new())
            .unwrap();
        let (idx, peak) = volume.argmax().unwrap();

        assert_eq!(idx, Size3::new([2, 2, 50]));
        assert_abs_diff_eq!(grid.position_along(2, 50), SOURCE_DEPTH as f32, epsilon = 1e-7);
        assert!(peak > 20.0 && peak <= 25.0, "peak {}", peak);
    }

    #[test]
    fn coherence_weighting_keeps_the_focus() {
        let signals = point_source_ensemble(0.0);
        let config = config(true);
        let grid = output_grid(&signals, &config.settings).unwrap();
        let beamformer = Beamformer::new(
            &config,
            Arc::new(UniformSensitivity),
            LogManager::silent(Beamformer::NAME),
        )
        .unwrap();
        let pool = WorkerPool::with_workers(2).unwrap();
        let progress = ProgressTracker::new();

        let volume = beamformer
            .reconstruct(&signals, grid, &pool, &progress)
            .unwrap();
        let (idx, _) = volume.argmax().unwrap();
        assert_eq!(idx, Size3::new([2, 2, 100]));
    }

    #[test]
    fn sensitivity_field_scales_voxels() {
        let signals = point_source_ensemble(0.0);
        let pool = WorkerPool::with_workers(1).unwrap();
        let reconstruct = |weighting: bool| {
            let mut config = config(false);
            config.settings.set_sensitivity_weighting(weighting);
            let grid = output_grid(&signals, &config.settings).unwrap();
            let beamformer = Beamformer::new(
                &config,
                Arc::new(|_voxel: Float3| 0.5f32),
                LogManager::silent(Beamformer::NAME),
            )
            .unwrap();
            beamformer
                .reconstruct(&signals, grid, &pool, &ProgressTracker::new())
                .unwrap()
        };

        let plain = reconstruct(false).max_value().unwrap();
        let weighted = reconstruct(true).max_value().unwrap();
        assert_abs_diff_eq!(weighted, 0.5 * plain, epsilon = 1e-4);
    }
}

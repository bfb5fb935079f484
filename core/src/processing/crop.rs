use crate::acquisition::{Acquisition, Grid, TimeSignal, UltrasoundSignals, Volume};
use crate::config::{CropAxis, ReconSettings};
use crate::math::Size3;
use crate::prelude::{ProcessingStage, SaftError, SaftResult, StageConfig};
use crate::telemetry::LogManager;

/// Scan positions closer than this to a lateral crop bound count as inside [m].
const LATERAL_TOLERANCE: f32 = 1e-7;

fn sorted_bounds(settings: &ReconSettings) -> [(f32, f32); 3] {
    let mut sorted = settings.clone();
    sorted.sort_cropping();
    CropAxis::ALL.map(|axis| sorted.crop_bounds(axis))
}

/// Resolves the crop window of `settings` to an inclusive voxel index box of `grid`.
pub fn plan_volume_crop(grid: &Grid, settings: &ReconSettings) -> SaftResult<(Size3, Size3)> {
    let bounds = sorted_bounds(settings);
    let mut lo = Size3::default();
    let mut hi = Size3::default();

    for (axis, (min, max)) in bounds.into_iter().enumerate() {
        if grid.dims[axis] == 0 {
            return Err(SaftError::InvalidRange(format!(
                "axis {} of the input volume is empty",
                axis
            )));
        }
        if max < grid.min_pos(axis) || min > grid.max_pos(axis) {
            return Err(SaftError::InvalidRange(format!(
                "crop window [{}, {}] misses axis {} extent [{}, {}]",
                min,
                max,
                axis,
                grid.min_pos(axis),
                grid.max_pos(axis)
            )));
        }
        lo[axis] = grid.nearest_index(axis, min);
        hi[axis] = grid.nearest_index(axis, max);
        if hi[axis] < lo[axis] {
            return Err(SaftError::InvalidRange(format!(
                "crop indices {}..={} are inverted on axis {}",
                lo[axis], hi[axis], axis
            )));
        }
    }
    Ok((lo, hi))
}

/// Restricts `volume` to the physical sub-region requested in `settings`.
pub fn crop_volume(volume: &Volume, settings: &ReconSettings) -> SaftResult<Volume> {
    let (lo, hi) = plan_volume_crop(volume.grid(), settings)?;
    volume.sub_volume(lo, hi)
}

fn time_window(signal: &TimeSignal, t_min: f32, t_max: f32) -> SaftResult<(usize, usize)> {
    let n = signal.len();
    if n == 0 {
        return Err(SaftError::InvalidRange("cannot crop an empty trace".into()));
    }
    let half_sample = 0.5 / signal.sample_rate();
    let first = signal.time_of(0);
    let last = signal.time_of(n - 1);
    if t_max < first - half_sample || t_min > last + half_sample {
        return Err(SaftError::InvalidRange(format!(
            "time window [{}, {}] misses trace window [{}, {}]",
            t_min, t_max, first, last
        )));
    }

    let index = |t: f32| -> usize {
        let fractional = ((t - signal.delta_t()) * signal.sample_rate()).round();
        if fractional <= 0.0 {
            0
        } else {
            (fractional as usize).min(n - 1)
        }
    };
    let (lo, hi) = (index(t_min), index(t_max));
    if hi < lo {
        return Err(SaftError::InvalidRange(format!(
            "sample window {}..={} is inverted",
            lo, hi
        )));
    }
    Ok((lo, hi))
}

/// Per trace: `None` when the trace falls outside the lateral window, else its
/// inclusive sample window.
fn plan_signal_crop(
    signals: &UltrasoundSignals,
    settings: &ReconSettings,
) -> SaftResult<Vec<Option<(usize, usize)>>> {
    let [(t_min, t_max), (x_min, x_max), (y_min, y_max)] = sorted_bounds(settings);
    let inside = |value: f32, min: f32, max: f32| {
        value >= min - LATERAL_TOLERANCE && value <= max + LATERAL_TOLERANCE
    };

    let mut plan = Vec::with_capacity(signals.len());
    for signal in signals {
        let pos = signal.pos();
        if inside(pos[0], x_min, x_max) && inside(pos[1], y_min, y_max) {
            plan.push(Some(time_window(signal, t_min, t_max)?));
        } else {
            plan.push(None);
        }
    }

    if plan.iter().all(Option::is_none) {
        return Err(SaftError::InvalidRange(format!(
            "no scan position inside x [{}, {}], y [{}, {}]",
            x_min, x_max, y_min, y_max
        )));
    }
    Ok(plan)
}

/// Crops a signal ensemble: traces outside the lateral window are dropped and
/// the rest are cut to the time window.
pub fn crop_signals(
    signals: UltrasoundSignals,
    settings: &ReconSettings,
) -> SaftResult<UltrasoundSignals> {
    let plan = plan_signal_crop(&signals, settings)?;
    Ok(signals
        .into_iter()
        .zip(plan)
        .filter_map(|(mut signal, window)| {
            let (lo, hi) = window?;
            signal.retain_window(lo, hi);
            Some(signal)
        })
        .collect())
}

/// Spatial cropping stage; a pass-through when cropping is disabled.
pub struct CropStage {
    settings: Option<ReconSettings>,
    logger: LogManager,
}

impl CropStage {
    pub const NAME: &'static str = "saft::crop";

    pub fn new(logger: LogManager) -> Self {
        Self {
            settings: None,
            logger,
        }
    }

    fn active_settings(&self) -> SaftResult<Option<&ReconSettings>> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| SaftError::Internal("crop stage not initialized".into()))?;
        Ok(settings.crop_enabled().then_some(settings))
    }
}

impl ProcessingStage for CropStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn initialize(&mut self, config: &StageConfig) -> SaftResult<()> {
        self.settings = Some(config.settings.clone());
        Ok(())
    }

    fn plan(&self, input: &Acquisition) -> SaftResult<()> {
        let Some(settings) = self.active_settings()? else {
            return Ok(());
        };
        match input {
            Acquisition::Signals(signals) => plan_signal_crop(signals, settings).map(|_| ()),
            Acquisition::Volume(volume) => plan_volume_crop(volume.grid(), settings).map(|_| ()),
        }
    }

    fn execute(&mut self, input: Acquisition) -> SaftResult<Acquisition> {
        let Some(settings) = self.active_settings()? else {
            return Ok(input);
        };

        match input {
            Acquisition::Signals(signals) => {
                let before = signals.len();
                let cropped = crop_signals(signals, settings)?;
                self.logger.record(&format!(
                    "Cropped ensemble from {} to {} traces",
                    before,
                    cropped.len()
                ));
                Ok(Acquisition::Signals(cropped))
            }
            Acquisition::Volume(volume) => {
                let cropped = crop_volume(&volume, settings)?;
                self.logger.record(&format!(
                    "Cropped volume from {:?} to {:?}",
                    volume.dims().as_array(),
                    cropped.dims().as_array()
                ));
                Ok(Acquisition::Volume(cropped))
            }
        }
    }

    fn cleanup(&mut self) {
        self.settings = None;
    }
}

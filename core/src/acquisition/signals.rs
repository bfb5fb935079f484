use crate::acquisition::volume::Volume;
use crate::math::{Float3, StatsHelper};
use crate::prelude::{SaftError, SaftResult};
use rayon::prelude::*;
use std::ops::Index;

/// Acquisition metadata attached to every trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSignalProperties {
    /// sampling rate of the acquisition [Hz]
    pub sample_rate: f32,
    /// time between the emission event and the first sample [s]
    pub delta_t: f32,
    /// transducer position in the global coordinate system [m]
    pub pos: Float3,
}

impl Default for TimeSignalProperties {
    fn default() -> Self {
        Self {
            sample_rate: 1e9,
            delta_t: 0.0,
            pos: Float3::default(),
        }
    }
}

/// One time-domain trace. The sample count is fixed after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSignal {
    samples: Vec<f32>,
    props: TimeSignalProperties,
}

impl TimeSignal {
    pub fn new(nt: usize) -> Self {
        Self {
            samples: vec![0.0; nt],
            props: TimeSignalProperties::default(),
        }
    }

    pub fn from_samples(samples: Vec<f32>, props: TimeSignalProperties) -> SaftResult<Self> {
        if !props.sample_rate.is_finite() || props.sample_rate <= 0.0 {
            return Err(SaftError::InvalidArgument(format!(
                "sample rate must be positive, got {}",
                props.sample_rate
            )));
        }
        Ok(Self { samples, props })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn props(&self) -> &TimeSignalProperties {
        &self.props
    }

    pub fn sample_rate(&self) -> f32 {
        self.props.sample_rate
    }

    pub fn delta_t(&self) -> f32 {
        self.props.delta_t
    }

    pub fn pos(&self) -> Float3 {
        self.props.pos
    }

    /// Time of sample `idx` relative to the emission event.
    pub fn time_of(&self, idx: usize) -> f32 {
        self.props.delta_t + idx as f32 / self.props.sample_rate
    }

    pub fn mean(&self) -> f64 {
        StatsHelper::mean(&self.samples)
    }

    /// Removes the DC content so that the mean of the trace is zero.
    pub fn remove_dc(&mut self) {
        StatsHelper::remove_mean(&mut self.samples);
    }

    /// Keeps samples `lo..=hi`, shifting `delta_t` to the new first sample.
    pub(crate) fn retain_window(&mut self, lo: usize, hi: usize) {
        let delta_t = self.time_of(lo);
        self.samples.truncate(hi + 1);
        self.samples.drain(..lo);
        self.props.delta_t = delta_t;
    }
}

/// Ordered collection of traces, one per scan position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UltrasoundSignals {
    signals: Vec<TimeSignal>,
}

impl UltrasoundSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, signal: TimeSignal) {
        self.signals.push(signal);
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeSignal> {
        self.signals.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, TimeSignal> {
        self.signals.iter_mut()
    }

    pub fn as_slice(&self) -> &[TimeSignal] {
        &self.signals
    }

    /// Removes the DC offset of every trace, one trace per rayon task.
    pub fn remove_dc(&mut self) {
        self.signals.par_iter_mut().for_each(TimeSignal::remove_dc);
    }

    /// Splits a volumetric time series with axes (t, x, y) into one trace per
    /// (x, y) column, positioned at the column centre with z = 0.
    pub fn from_volume(volume: &Volume) -> SaftResult<Self> {
        let dt = volume.res()[0];
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SaftError::InvalidArgument(format!(
                "time pitch must be positive, got {}",
                dt
            )));
        }

        let nt = volume.dim(0);
        let grid = *volume.grid();
        let values = volume.as_slice()?;
        let mut signals = Vec::with_capacity(volume.dim(1) * volume.dim(2));
        if nt > 0 {
            for (column, samples) in values.chunks(nt).enumerate() {
                let ix = column % grid.dims[1];
                let iy = column / grid.dims[1];
                let props = TimeSignalProperties {
                    sample_rate: 1.0 / dt,
                    delta_t: grid.position_along(0, 0),
                    pos: Float3::new([
                        grid.position_along(1, ix),
                        grid.position_along(2, iy),
                        0.0,
                    ]),
                };
                signals.push(TimeSignal::from_samples(samples.to_vec(), props)?);
            }
        }
        Ok(Self { signals })
    }
}

impl Index<usize> for UltrasoundSignals {
    type Output = TimeSignal;

    fn index(&self, index: usize) -> &TimeSignal {
        &self.signals[index]
    }
}

impl FromIterator<TimeSignal> for UltrasoundSignals {
    fn from_iter<I: IntoIterator<Item = TimeSignal>>(iter: I) -> Self {
        Self {
            signals: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for UltrasoundSignals {
    type Item = TimeSignal;
    type IntoIter = std::vec::IntoIter<TimeSignal>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.into_iter()
    }
}

impl<'a> IntoIterator for &'a UltrasoundSignals {
    type Item = &'a TimeSignal;
    type IntoIter = std::slice::Iter<'a, TimeSignal>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.iter()
    }
}

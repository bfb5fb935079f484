//! Containers for recorded data and reconstructed volumes.

pub mod signals;
pub mod volume;

pub use signals::{TimeSignal, TimeSignalProperties, UltrasoundSignals};
pub use volume::{Grid, Volume};

use crate::prelude::SaftResult;

/// Input handed to the engine: either a scattered signal ensemble or a
/// volumetric time series with axes (t, x, y).
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Signals(UltrasoundSignals),
    Volume(Volume),
}

impl Acquisition {
    /// Number of traces (scan positions) carried.
    pub fn trace_count(&self) -> usize {
        match self {
            Acquisition::Signals(signals) => signals.len(),
            Acquisition::Volume(volume) => volume.dim(1) * volume.dim(2),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Acquisition::Signals(signals) => {
                signals.is_empty() || signals.iter().all(|s| s.is_empty())
            }
            Acquisition::Volume(volume) => volume.is_empty(),
        }
    }

    pub fn into_signals(self) -> SaftResult<UltrasoundSignals> {
        match self {
            Acquisition::Signals(signals) => Ok(signals),
            Acquisition::Volume(volume) => UltrasoundSignals::from_volume(&volume),
        }
    }
}

impl From<UltrasoundSignals> for Acquisition {
    fn from(signals: UltrasoundSignals) -> Self {
        Acquisition::Signals(signals)
    }
}

impl From<Volume> for Acquisition {
    fn from(volume: Volume) -> Self {
        Acquisition::Volume(volume)
    }
}

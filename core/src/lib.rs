//! Delay-and-sum SAFT reconstruction core.
//!
//! Raw traces recorded at many scan positions are DC-corrected, optionally
//! cropped, and focused into a volume by summing every trace at the acoustic
//! time of flight to each voxel. The [`Saft`] engine owns input, configuration
//! and result and runs the pipeline on a background task.

pub mod acquisition;
pub mod config;
pub mod engine;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use acquisition::{Acquisition, TimeSignal, TimeSignalProperties, UltrasoundSignals, Volume};
pub use config::{CropAxis, ReconSettings, Transducer};
pub use engine::{EngineStatus, Saft};
pub use prelude::{ProcessingStage, SaftError, SaftResult};

pub mod beamform;
pub mod crop;
pub mod dc;
pub mod pool;
pub mod weighting;

pub use beamform::{output_grid, ApertureCone, Beamformer};
pub use crop::{crop_signals, crop_volume, CropStage};
pub use dc::DcRemovalStage;
pub use pool::WorkerPool;
pub use weighting::{CoherenceAccumulator, SensitivityField, UniformSensitivity};

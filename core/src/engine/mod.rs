//! Reconstruction lifecycle: backend selection, the background pipeline and
//! the `Saft` engine facade.

pub mod backend;
pub mod pipeline;
pub mod saft;

pub use backend::Backend;
pub use pipeline::{ReconOutput, ReconPipeline};
pub use saft::{EngineStatus, Saft};

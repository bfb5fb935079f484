pub mod settings;
pub mod transducer;

pub use settings::{CropAxis, ReconSettings};
pub use transducer::Transducer;

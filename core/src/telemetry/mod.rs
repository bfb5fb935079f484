pub mod log;
pub mod progress;
pub mod timer;

pub use self::log::LogManager;
pub use progress::ProgressTracker;
pub use timer::Timer;

use crate::acquisition::Acquisition;
use crate::config::{ReconSettings, Transducer};

/// Snapshot of the configuration a stage runs against.
#[derive(Debug, Clone, Default)]
pub struct StageConfig {
    pub settings: ReconSettings,
    pub transducer: Transducer,
}

/// Common error type for configuration and reconstruction.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SaftError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type SaftResult<T> = Result<T, SaftError>;

/// Preprocessing stage applied to the acquisition ahead of beamforming.
pub trait ProcessingStage: Send {
    fn name(&self) -> &'static str;

    fn initialize(&mut self, config: &StageConfig) -> SaftResult<()>;

    /// Checks the input without touching it, so configuration problems surface
    /// before a run starts.
    fn plan(&self, _input: &Acquisition) -> SaftResult<()> {
        Ok(())
    }

    fn execute(&mut self, input: Acquisition) -> SaftResult<Acquisition>;

    fn cleanup(&mut self);
}

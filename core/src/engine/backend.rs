use crate::config::ReconSettings;
use crate::prelude::{SaftError, SaftResult};

/// Compute backend a reconstruction runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cpu,
}

impl Backend {
    /// Resolves the backend requested by `settings`. GPU execution is not part
    /// of this build, so asking for it is a configuration error.
    pub fn select(settings: &ReconSettings) -> SaftResult<Self> {
        if settings.use_gpu() {
            return Err(SaftError::BackendUnavailable(
                "GPU reconstruction is not available in this build".into(),
            ));
        }
        Ok(Backend::Cpu)
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::Cpu => "CPU",
        }
    }
}

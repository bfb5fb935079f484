use crate::generator::phantom::GeneratorConfig;
use anyhow::Context;
use saftcore::{ReconSettings, Saft, Transducer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything one offline run needs: engine configuration plus the phantom to scan.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub transducer: Transducer,
    pub settings: ReconSettings,
    pub generator: GeneratorConfig,
    /// defaults to the host's parallelism
    pub workers: Option<usize>,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(positions: usize, samples: usize, workers: Option<usize>) -> Self {
        Self {
            generator: GeneratorConfig {
                nx: positions,
                ny: positions,
                samples,
                ..Default::default()
            },
            workers,
            ..Default::default()
        }
    }

    /// Copies the configuration into `saft`, validating what deserialization let through.
    pub fn apply(&self, saft: &mut Saft) -> anyhow::Result<()> {
        self.transducer
            .validate()
            .context("validating transducer geometry")?;
        self.settings
            .validate()
            .context("validating reconstruction settings")?;
        *saft.transducer_mut() = self.transducer;
        *saft.settings_mut() = self.settings.clone();
        if let Some(workers) = self.workers {
            saft.set_workers(workers).context("configuring workers")?;
        }
        Ok(())
    }
}

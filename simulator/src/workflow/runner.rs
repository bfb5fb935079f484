use crate::generator::phantom::build_ensemble;
use crate::workflow::config::WorkflowConfig;
use crate::workflow::report::RunReport;
use anyhow::Context;
use log::info;
use saftcore::telemetry::LogManager;
use saftcore::Saft;

pub struct WorkflowResult {
    pub traces: usize,
    pub dims: [usize; 3],
    pub peak_value: f32,
    pub peak_position: [f32; 3],
    pub recon_seconds: f64,
}

impl WorkflowResult {
    pub fn report(&self, description: Option<String>) -> RunReport {
        RunReport {
            description,
            traces: self.traces,
            dims: self.dims,
            peak_value: self.peak_value,
            peak_position: self.peak_position,
            recon_seconds: self.recon_seconds,
        }
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    logger: LogManager,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            logger: LogManager::new(Saft::NAME),
        }
    }

    pub fn with_logger(mut self, logger: LogManager) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Synthesizes the configured scan, reconstructs it and locates the brightest voxel.
    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        let signals = build_ensemble(&self.config.generator, &self.config.settings)
            .context("synthesizing scan")?;
        let traces = signals.len();
        info!(
            "Synthesized {} traces of {} samples",
            traces, self.config.generator.samples
        );

        let mut saft = Saft::with_logger(self.logger);
        self.config.apply(&mut saft)?;
        saft.set_input(signals).context("handing the ensemble to the engine")?;
        saft.launch().context("launching reconstruction")?;
        saft.wait().context("running reconstruction")?;

        let volume = saft.volume().context("collecting the reconstruction")?;
        let (index, peak_value) = volume.argmax().context("reconstructed volume is empty")?;
        let peak = volume.position(index);

        Ok(WorkflowResult {
            traces,
            dims: *volume.dims().as_array(),
            peak_value,
            peak_position: *peak.as_array(),
            recon_seconds: saft.recon_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::phantom::{GeneratorConfig, PointSource};

    #[test]
    fn runner_focuses_the_point_source() {
        let cfg = WorkflowConfig {
            generator: GeneratorConfig {
                nx: 5,
                ny: 5,
                samples: 400,
                noise: 0.0,
                sources: vec![PointSource {
                    z: 1e-3,
                    ..Default::default()
                }],
                ..Default::default()
            },
            workers: Some(2),
            ..Default::default()
        };
        let runner = Runner::new(cfg).with_logger(LogManager::silent(Saft::NAME));
        let result = runner.execute().unwrap();

        assert_eq!(result.traces, 25);
        assert_eq!(result.dims, [5, 5, 400]);
        assert!(result.peak_value > 0.0);
        let [x, y, z] = result.peak_position;
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6, "lateral peak at ({}, {})", x, y);
        assert!((z - 1e-3).abs() < 1e-5, "axial peak at {}", z);
    }

    #[test]
    fn runner_surfaces_configuration_errors() {
        let mut cfg = WorkflowConfig::from_args(3, 64, Some(1));
        cfg.settings.set_use_gpu(true);
        let runner = Runner::new(cfg).with_logger(LogManager::silent(Saft::NAME));
        let err = runner.execute().err().unwrap();
        assert!(format!("{:#}", err).contains("backend unavailable"));
    }
}

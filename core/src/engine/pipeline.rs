use crate::acquisition::{Acquisition, UltrasoundSignals, Volume};
use crate::prelude::{ProcessingStage, SaftError, SaftResult, StageConfig};
use crate::processing::{
    output_grid, Beamformer, CropStage, DcRemovalStage, SensitivityField, WorkerPool,
};
use crate::telemetry::{LogManager, ProgressTracker};
use std::sync::Arc;

/// Result of one reconstruction run.
#[derive(Debug, Clone)]
pub struct ReconOutput {
    pub volume: Volume,
    /// The ensemble after DC removal and cropping, as it entered beamforming.
    pub signals: UltrasoundSignals,
}

/// Preprocessing stages followed by the beamformer, configured for one run.
pub struct ReconPipeline {
    config: StageConfig,
    stages: Vec<Box<dyn ProcessingStage>>,
    beamformer: Beamformer,
    pool: WorkerPool,
    progress: Arc<ProgressTracker>,
    logger: LogManager,
}

impl ReconPipeline {
    pub fn new(
        config: StageConfig,
        field: Arc<dyn SensitivityField>,
        pool: WorkerPool,
        progress: Arc<ProgressTracker>,
        logger: LogManager,
    ) -> SaftResult<Self> {
        let mut stages: Vec<Box<dyn ProcessingStage>> = vec![
            Box::new(DcRemovalStage::new(logger.scoped(DcRemovalStage::NAME))),
            Box::new(CropStage::new(logger.scoped(CropStage::NAME))),
        ];
        for stage in stages.iter_mut() {
            stage.initialize(&config)?;
        }
        let beamformer = Beamformer::new(&config, field, logger.scoped(Beamformer::NAME))?;

        Ok(Self {
            config,
            stages,
            beamformer,
            pool,
            progress,
            logger,
        })
    }

    /// Runs every stage's preflight check against `input`.
    pub fn plan(&self, input: &Acquisition) -> SaftResult<()> {
        for stage in &self.stages {
            stage.plan(input)?;
        }
        Ok(())
    }

    pub fn run(mut self, input: Acquisition) -> SaftResult<ReconOutput> {
        let logger = self.logger;
        let stages = &mut self.stages;
        let staged = self.pool.install(move || {
            let mut data = input;
            for stage in stages.iter_mut() {
                logger.debug(&format!("Executing stage {}", stage.name()));
                data = stage.execute(data)?;
            }
            Ok::<_, SaftError>(data)
        });
        for stage in self.stages.iter_mut() {
            stage.cleanup();
        }

        let signals = staged?.into_signals()?;
        let grid = output_grid(&signals, &self.config.settings)?;
        self.logger.record(&format!(
            "Reconstructing volume of {:?} voxels with pitch {:?}",
            grid.dims.as_array(),
            grid.res.as_array()
        ));

        let volume = self
            .beamformer
            .reconstruct(&signals, grid, &self.pool, &self.progress)?;
        Ok(ReconOutput { volume, signals })
    }
}

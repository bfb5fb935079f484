use crate::acquisition::{Acquisition, Volume};
use crate::math::StatsHelper;
use crate::prelude::{ProcessingStage, SaftResult, StageConfig};
use crate::telemetry::{LogManager, Timer};
use rayon::prelude::*;

/// Removes the DC offset of every trace ahead of beamforming.
pub struct DcRemovalStage {
    logger: LogManager,
}

impl DcRemovalStage {
    pub const NAME: &'static str = "saft::dc_removal";

    pub fn new(logger: LogManager) -> Self {
        Self { logger }
    }
}

/// DC removal over a volumetric (t, x, y) series, one time column per task.
pub fn remove_dc_columns(volume: &mut Volume) -> SaftResult<()> {
    let nt = volume.dim(0);
    if nt == 0 {
        return Ok(());
    }
    volume
        .as_slice_mut()?
        .par_chunks_mut(nt)
        .for_each(|column| {
            StatsHelper::remove_mean(column);
        });
    Ok(())
}

impl ProcessingStage for DcRemovalStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn initialize(&mut self, _config: &StageConfig) -> SaftResult<()> {
        Ok(())
    }

    fn execute(&mut self, input: Acquisition) -> SaftResult<Acquisition> {
        self.logger.record("Removing DC offset...");
        let mut timer = Timer::started();

        let output = match input {
            Acquisition::Signals(mut signals) => {
                signals.remove_dc();
                Acquisition::Signals(signals)
            }
            Acquisition::Volume(mut volume) => {
                remove_dc_columns(&mut volume)?;
                Acquisition::Volume(volume)
            }
        };

        self.logger.record(&format!(
            "DC offset removed in {:.4} seconds",
            timer.stop_secs()?
        ));
        Ok(output)
    }

    fn cleanup(&mut self) {}
}

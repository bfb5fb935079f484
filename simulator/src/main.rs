use clap::Parser;
use saftcore::telemetry::LogManager;
use saftcore::Saft;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline SAFT reconstruction driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Scan positions per lateral axis
    #[arg(long, default_value_t = 9)]
    positions: usize,
    #[arg(long, default_value_t = 768)]
    samples: usize,
    /// Worker threads, defaults to the host's parallelism
    #[arg(long)]
    workers: Option<usize>,
    /// Append a JSON summary of the run to this file
    #[arg(long, default_value = "tools/data/saft_reconstruction.log")]
    report: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.positions, args.samples, args.workers)
    };

    let logger = LogManager::new(Saft::NAME).with_max_level(log::max_level());
    let runner = Runner::new(workflow_config).with_logger(logger);
    let result = runner.execute()?;

    println!(
        "Reconstructed {} traces -> volume {:?}, peak {:.4} at {:?} m in {:.3} s",
        result.traces,
        result.dims,
        result.peak_value,
        result.peak_position,
        result.recon_seconds
    );

    let report = result.report(runner.config().generator.description.clone());
    report.append_to(&args.report)?;
    Ok(())
}

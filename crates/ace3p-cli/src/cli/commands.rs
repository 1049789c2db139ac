use super::helpers::RunConfig;
use super::CliError;
use ace3p_core::codec::ace3p;
use ace3p_core::domain::Ace3pError;
use anyhow::Context;
use ace3p_core::exec::SystemRunner;
use ace3p_core::optimize::{generator_by_name, Optimizer};
use ace3p_core::workflow::Workflow;
use std::path::{Path, PathBuf};

#[derive(clap::Args)]
pub(super) struct ConfigArgs {
    /// JSON run-configuration path
    #[arg(long, value_name = "FILE")]
    pub(super) config: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct InspectArgs {
    /// Solver input deck to parse and reprint
    pub(super) file: PathBuf,
}

/// Runs one parameter point through the pipeline. Vector-valued inputs
/// are rejected here; sweeps go through the sweep command.
pub(super) fn run_single_command(args: ConfigArgs) -> Result<i32, CliError> {
    let config = RunConfig::load(&args.config)?;
    let point = config.single_point()?;
    let workflow = Workflow::new(config.workflow_config()?)?;
    let mut runner = SystemRunner;
    let outcome = workflow.run_point(&point, &mut runner)?;
    for (name, value) in &outcome.record.outputs {
        println!(
            "{}\t{}",
            name,
            value.map(|value| value.to_string()).unwrap_or_else(|| "nan".to_string())
        );
    }
    Ok(0)
}

pub(super) fn run_sweep_command(args: ConfigArgs) -> Result<i32, CliError> {
    let config = RunConfig::load(&args.config)?;
    let sweep = config.sweep_spec()?;
    let workflow = Workflow::new(config.workflow_config()?)?;
    let mut runner = SystemRunner;
    let records = workflow.run_sweep(&sweep, &mut runner)?;
    tracing::info!("sweep finished, {} points evaluated", records.len());
    Ok(0)
}

pub(super) fn run_optimize_command(args: ConfigArgs) -> Result<i32, CliError> {
    let config = RunConfig::load(&args.config)?;
    let fixed = config.single_point()?;
    let optimizer = Optimizer::new(config.optimizer_config()?)?;
    let generator_name = config
        .optimization_parameters
        .as_ref()
        .map(|parameters| parameters.generator.clone())
        .unwrap_or_default();
    let seed = config
        .optimization_parameters
        .as_ref()
        .and_then(|parameters| parameters.seed);
    let mut generator = generator_by_name(&generator_name, seed)?;

    let workflow = Workflow::new(config.workflow_config()?)?;
    let mut runner = SystemRunner;
    let records = optimizer.run(generator.as_mut(), &mut |trial| {
        let mut point = trial.clone();
        point.extend(fixed.iter().cloned());
        let outcome = workflow.run_point(&point, &mut runner)?;
        outcome.artifacts.s3p_output.ok_or_else(|| {
            Ace3pError::external_process(
                "RUN.NO_S3P_OUTPUT",
                "pipeline produced no scattering output for this trial",
            )
        })
    })?;
    tracing::info!("optimization finished after {} iterations", records.len());
    Ok(0)
}

/// Parses an ACE3P deck and prints its normalized serialization.
pub(super) fn run_inspect_command(args: InspectArgs) -> Result<i32, CliError> {
    let document = ace3p::parse(&read_input(&args.file)?)?;
    print!("{}", ace3p::serialize(&document));
    Ok(0)
}

fn read_input(path: &Path) -> Result<String, CliError> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    Ok(text)
}

mod commands;
mod helpers;

use ace3p_core::domain::Ace3pError;
use clap::Parser;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let core_error = error.as_core_error();
            eprintln!("{}", core_error.diagnostic_line());
            core_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "lume-ace3p-rs", about = "ACE3P simulation pipeline driver")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run a single parameter point through the pipeline
    Run(commands::ConfigArgs),
    /// Run a parameter sweep over the configured axes
    Sweep(commands::ConfigArgs),
    /// Run the optimization loop around the pipeline
    Optimize(commands::ConfigArgs),
    /// Parse an ACE3P deck and print its normalized form
    Inspect(commands::InspectArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_single_command(args),
        CliCommand::Sweep(args) => commands::run_sweep_command(args),
        CliCommand::Optimize(args) => commands::run_optimize_command(args),
        CliCommand::Inspect(args) => commands::run_inspect_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Core(Ace3pError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_core_error(&self) -> Ace3pError {
        match self {
            Self::Usage(message) => {
                Ace3pError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Core(error) => error.clone(),
            Self::Internal(error) => Ace3pError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}

impl From<Ace3pError> for CliError {
    fn from(error: Ace3pError) -> Self {
        Self::Core(error)
    }
}

mod commands;
mod helpers;

use clap::Parser;
use relhf_core::domain::RelhfError;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "relhf=info";

pub fn run_from_env() -> i32 {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_relhf_error();
            eprintln!("{}", error.diagnostic_line());
            if let Some(summary_line) = error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            error.exit_code()
        }
    }
}

/// Logs go to stderr so the orbital table on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
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
#[command(name = "relhf", version, about = "Relativistic Dirac-Hartree-Fock atomic solver")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Solve the core (and valence orbitals) and print the orbital table
    Run(commands::RunArgs),
    /// Print the default run configuration as JSON
    Config,
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_command(args),
        CliCommand::Config => commands::config_command(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(RelhfError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_relhf_error(&self) -> RelhfError {
        match self {
            Self::Usage(message) => RelhfError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => RelhfError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}

/// Converts a library error into the categorised CLI error.
fn compute(error: impl Into<RelhfError>) -> CliError {
    CliError::Compute(error.into())
}

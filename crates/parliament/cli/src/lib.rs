//! Parliament CLI - command-line surface for the constitutional parliament
//!
//! - `ask` sends one request through the chorus and prints the aggregated
//!   response
//! - `constitution` prints the validated constitution in effect

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use parliament_constitution::Constitution;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use commands::{ask, constitution};
pub use error::{CliError, CliResult};

#[derive(Parser)]
#[command(name = "parliament")]
#[command(about = "Parliament - seven bounded subsystems under one constitution", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    output: output::OutputFormat,

    /// Constitution file (JSON, TOML or YAML); built-in default otherwise
    #[arg(long, global = true, env = "PARLIAMENT_CONSTITUTION")]
    constitution: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the parliament
    Ask(ask::AskArgs),

    /// Print the constitution in effect as JSON
    Constitution,
}

/// Run using the current process arguments.
pub async fn run() -> CliResult<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    let filter = if cli.verbose { "debug" } else { "warn" };
    // Logs go to stderr so JSON output stays parseable.
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();

    let constitution = load_constitution(cli.constitution.as_deref())?;
    match cli.command {
        Commands::Ask(args) => ask::execute(args, constitution, cli.output).await,
        Commands::Constitution => constitution::execute(&constitution),
    }
}

fn load_constitution(path: Option<&Path>) -> CliResult<Constitution> {
    let constitution = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading constitution");
            Constitution::load(path)?
        }
        None => Constitution::from_env()?,
    };
    Ok(constitution)
}

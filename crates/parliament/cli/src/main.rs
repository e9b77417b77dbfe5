use std::process::ExitCode;

use colored::Colorize;

#[tokio::main]
async fn main() -> ExitCode {
    match parliament_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

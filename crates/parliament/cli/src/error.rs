//! CLI error types

use parliament_chorus::ChorusError;
use parliament_constitution::ConstitutionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Constitution error: {0}")]
    Constitution(#[from] ConstitutionError),

    #[error(transparent)]
    Chorus(#[from] ChorusError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type CliResult<T> = Result<T, CliError>;

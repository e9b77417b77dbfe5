use thiserror::Error;

/// Errors raised while loading or validating a constitution.
#[derive(Debug, Error)]
pub enum ConstitutionError {
    #[error("failed to load constitution: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to parse constitution: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("constitution must define exactly seven subsystems; missing: {0}")]
    MissingSubsystem(String),

    #[error("constitution names an unknown subsystem: {0}")]
    UnknownSubsystem(String),

    #[error("constitution is missing the charter for mode: {0}")]
    MissingMode(String),

    #[error("invalid constitution setting {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConstitutionError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConstitutionError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

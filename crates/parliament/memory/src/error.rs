use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The store could not be reached. Never retried by the caller.
    #[error("memory store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

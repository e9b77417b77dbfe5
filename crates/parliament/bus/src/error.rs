use parliament_types::SubsystemId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    /// The bus has been shut down or cannot be reached.
    #[error("message bus unavailable: {0}")]
    Unavailable(String),

    /// The callee answered, but with a fault instead of a value.
    #[error("{target} failed to handle request: {message}")]
    Remote {
        target: SubsystemId,
        message: String,
    },
}

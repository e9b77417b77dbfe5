use parliament_memory::MemoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdjudicationError {
    /// A halt event could not be persisted; no decision was issued.
    #[error("failed to persist halt event: {0}")]
    Memory(#[from] MemoryError),

    #[error("invalid veto pattern: {0}")]
    Pattern(#[from] regex::Error),
}

use parliament_bus::BusError;
use parliament_compliance::ComplianceError;
use parliament_sentinel::AdjudicationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChorusError {
    #[error("chorus has been shut down")]
    ShutDown,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A wrapped subsystem call failed, including constraint violations.
    #[error(transparent)]
    Compliance(#[from] ComplianceError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Adjudication(#[from] AdjudicationError),
}

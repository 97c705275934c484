use thiserror::Error;

/// Categorized broker client failures, per the retry/status-code policy.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("not found")]
    NotFound,

    #[error("unprocessable: {body}")]
    Unprocessable { body: String },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("retries exhausted: {cause}")]
    RetriesExhausted { cause: Box<BrokerError> },

    #[error("cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),
}

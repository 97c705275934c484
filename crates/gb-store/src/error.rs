use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("agent not found: {0}")]
    AgentNotFound(uuid::Uuid),

    #[error("strategy not found: {0}")]
    StrategyNotFound(uuid::Uuid),

    #[error("cancelled")]
    Cancelled,

    #[error("malformed row: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

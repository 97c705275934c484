use thiserror::Error;

/// Everything that can fail a single `Tick`, collapsed to one type so
/// `handleError` has a single message to log and persist.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("broker error: {0}")]
    Broker(#[from] gb_broker::BrokerError),

    #[error("store error: {0}")]
    Store(#[from] gb_store::StoreError),

    #[error("strategy resolution failed: {0}")]
    Resolver(#[from] gb_strategy::ResolverError),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("unknown signal action: {0}")]
    UnknownAction(String),
}

impl WorkerError {
    /// Cancellation is never counted against the error budget; every other
    /// variant is.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkerError::Broker(gb_broker::BrokerError::Cancelled))
            || matches!(self, WorkerError::Store(gb_store::StoreError::Cancelled))
    }
}

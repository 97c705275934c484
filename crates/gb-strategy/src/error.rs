use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unknown node kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("malformed node: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("strategy {strategy_id} references unknown predefined strategy '{source_strategy_id}'")]
    StrategyMissing {
        strategy_id: Uuid,
        source_strategy_id: String,
    },

    #[error("strategy {strategy_id} failed to compile tree '{tree}': {reason}")]
    StrategyCompileError {
        strategy_id: Uuid,
        tree: &'static str,
        reason: String,
    },

    #[error("store error: {0}")]
    Store(#[from] gb_store::StoreError),
}

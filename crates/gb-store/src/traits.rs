use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gb_types::activity::{ActivityEntry, Severity};
use gb_types::agent::{Agent, PositionState};
use gb_types::order_record::OrderRecord;
use gb_types::strategy_row::StrategyRow;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreResult;

/// Read/write contract for agent rows, orders, activity log, and strategy
/// rows. No SQL is exposed outside implementors of this trait.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_active_agents(&self, token: &CancellationToken) -> StoreResult<Vec<Agent>>;

    async fn get_agent(&self, id: Uuid, token: &CancellationToken) -> StoreResult<Agent>;

    /// Also resets `consecutive_errors` to 0 and clears `error_message`.
    async fn update_last_run(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        signal: &str,
        token: &CancellationToken,
    ) -> StoreResult<()>;

    async fn update_current_position(
        &self,
        id: Uuid,
        position: Option<&PositionState>,
        token: &CancellationToken,
    ) -> StoreResult<()>;

    /// Returns the new consecutive-error count.
    async fn increment_errors(&self, id: Uuid, message: &str, token: &CancellationToken) -> StoreResult<i32>;

    async fn set_status(&self, id: Uuid, status: gb_types::agent::AgentStatus, token: &CancellationToken) -> StoreResult<()>;

    async fn create_order(&self, record: &OrderRecord, token: &CancellationToken) -> StoreResult<()>;

    async fn log(
        &self,
        agent_id: Uuid,
        account_id: &str,
        kind: &str,
        message: &str,
        data: Option<serde_json::Value>,
        severity: Severity,
        token: &CancellationToken,
    ) -> StoreResult<()>;

    async fn get_strategy(&self, id: Uuid, token: &CancellationToken) -> StoreResult<StrategyRow>;
}

pub(crate) fn activity_entry(
    agent_id: Uuid,
    account_id: &str,
    kind: &str,
    message: &str,
    data: Option<serde_json::Value>,
    severity: Severity,
) -> ActivityEntry {
    let mut entry = ActivityEntry::new(agent_id, account_id, kind, message, severity);
    if let Some(data) = data {
        entry = entry.with_data(data);
    }
    entry
}

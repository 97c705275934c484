use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gb_types::activity::{ActivityEntry, Severity};
use gb_types::agent::{Agent, AgentStatus, PositionState};
use gb_types::order_record::OrderRecord;
use gb_types::strategy_row::StrategyRow;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::AgentStore;

/// In-memory `AgentStore` for worker/orchestrator tests: a fake collaborator
/// standing in for the database, the way the teacher tests its engine
/// against a paper broker rather than a live one.
#[derive(Default)]
pub struct FakeAgentStore {
    pub agents: Mutex<Vec<Agent>>,
    pub strategies: Mutex<Vec<StrategyRow>>,
    pub orders: Mutex<Vec<OrderRecord>>,
    pub activity: Mutex<Vec<ActivityEntry>>,
}

impl FakeAgentStore {
    pub fn new(agents: Vec<Agent>, strategies: Vec<StrategyRow>) -> Self {
        Self {
            agents: Mutex::new(agents),
            strategies: Mutex::new(strategies),
            orders: Mutex::new(Vec::new()),
            activity: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentStore for FakeAgentStore {
    async fn get_active_agents(&self, _token: &CancellationToken) -> StoreResult<Vec<Agent>> {
        Ok(self
            .agents
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status == AgentStatus::Active)
            .cloned()
            .collect())
    }

    async fn get_agent(&self, id: Uuid, _token: &CancellationToken) -> StoreResult<Agent> {
        self.agents
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(StoreError::AgentNotFound(id))
    }

    async fn update_last_run(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        signal: &str,
        _token: &CancellationToken,
    ) -> StoreResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents.iter_mut().find(|a| a.id == id).ok_or(StoreError::AgentNotFound(id))?;
        agent.last_run_at = Some(at);
        agent.last_signal = Some(signal.to_string());
        agent.consecutive_errors = 0;
        agent.error_message = None;
        Ok(())
    }

    async fn update_current_position(
        &self,
        id: Uuid,
        position: Option<&PositionState>,
        _token: &CancellationToken,
    ) -> StoreResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents.iter_mut().find(|a| a.id == id).ok_or(StoreError::AgentNotFound(id))?;
        agent.current_position = position.cloned();
        Ok(())
    }

    async fn increment_errors(&self, id: Uuid, message: &str, _token: &CancellationToken) -> StoreResult<i32> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents.iter_mut().find(|a| a.id == id).ok_or(StoreError::AgentNotFound(id))?;
        agent.consecutive_errors += 1;
        agent.error_message = Some(message.to_string());
        Ok(agent.consecutive_errors)
    }

    async fn set_status(&self, id: Uuid, status: AgentStatus, _token: &CancellationToken) -> StoreResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents.iter_mut().find(|a| a.id == id).ok_or(StoreError::AgentNotFound(id))?;
        agent.status = status;
        Ok(())
    }

    async fn create_order(&self, record: &OrderRecord, _token: &CancellationToken) -> StoreResult<()> {
        self.orders.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn log(
        &self,
        agent_id: Uuid,
        account_id: &str,
        kind: &str,
        message: &str,
        data: Option<serde_json::Value>,
        severity: Severity,
        _token: &CancellationToken,
    ) -> StoreResult<()> {
        let mut entry = ActivityEntry::new(agent_id, account_id, kind, message, severity);
        if let Some(data) = data {
            entry = entry.with_data(data);
        }
        crate::mirror_log_to_tracing(agent_id, kind, message, severity);
        self.activity.lock().unwrap().push(entry);
        Ok(())
    }

    async fn get_strategy(&self, id: Uuid, _token: &CancellationToken) -> StoreResult<StrategyRow> {
        self.strategies
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::StrategyNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_types::agent::Timeframe;
    use rust_decimal::Decimal;

    fn agent(id: Uuid, status: AgentStatus) -> Agent {
        Agent {
            id,
            account_id: "acct-1".to_string(),
            symbol: "AAPL".to_string(),
            strategy_id: Uuid::new_v4(),
            status,
            timeframe: Timeframe::OneDay,
            interval_minutes: 15,
            lookback_days: 60,
            position_size_dollars: Decimal::new(100000, 2),
            paper: true,
            last_run_at: None,
            last_signal: None,
            error_message: None,
            consecutive_errors: 0,
            current_position: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn get_active_agents_filters_by_status() {
        let a1 = agent(Uuid::new_v4(), AgentStatus::Active);
        let a2 = agent(Uuid::new_v4(), AgentStatus::Paused);
        let store = FakeAgentStore::new(vec![a1.clone(), a2], vec![]);
        let active = store.get_active_agents(&CancellationToken::new()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a1.id);
    }

    #[tokio::test]
    async fn update_last_run_resets_error_budget() {
        let mut a = agent(Uuid::new_v4(), AgentStatus::Active);
        a.consecutive_errors = 3;
        a.error_message = Some("boom".to_string());
        let id = a.id;
        let store = FakeAgentStore::new(vec![a], vec![]);
        store
            .update_last_run(id, Utc::now(), "entry_long", &CancellationToken::new())
            .await
            .unwrap();
        let agent = store.get_agent(id, &CancellationToken::new()).await.unwrap();
        assert_eq!(agent.consecutive_errors, 0);
        assert!(agent.error_message.is_none());
        assert_eq!(agent.last_signal.as_deref(), Some("entry_long"));
    }

    #[tokio::test]
    async fn increment_errors_returns_new_count() {
        let a = agent(Uuid::new_v4(), AgentStatus::Active);
        let id = a.id;
        let store = FakeAgentStore::new(vec![a], vec![]);
        let c1 = store.increment_errors(id, "timeout", &CancellationToken::new()).await.unwrap();
        let c2 = store.increment_errors(id, "timeout", &CancellationToken::new()).await.unwrap();
        assert_eq!(c1, 1);
        assert_eq!(c2, 2);
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gb_broker::BrokerClient;
use gb_store::AgentStore;
use gb_strategy::StrategyResolver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::market_data::MarketDataClient;
use crate::worker::AgentWorker;

struct RunningWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Maintains the invariant "running workers = active agents" by periodic
/// reconciliation against the store's active-agent set.
pub struct Orchestrator<S: AgentStore + 'static> {
    store: Arc<S>,
    broker: Arc<BrokerClient>,
    resolver: Arc<StrategyResolver<S>>,
    market_data: Arc<dyn MarketDataClient>,
    max_consecutive_errors: i32,
    poll_interval: Duration,
    workers: HashMap<Uuid, RunningWorker>,
}

impl<S: AgentStore + 'static> Orchestrator<S> {
    pub fn new(
        store: Arc<S>,
        broker: Arc<BrokerClient>,
        resolver: Arc<StrategyResolver<S>>,
        market_data: Arc<dyn MarketDataClient>,
        max_consecutive_errors: i32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            broker,
            resolver,
            market_data,
            max_consecutive_errors,
            poll_interval,
            workers: HashMap::new(),
        }
    }

    #[instrument(skip(self, token))]
    pub async fn run(&mut self, token: CancellationToken) {
        self.reconcile(&token).await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.reconcile(&token).await;
                }
            }
        }

        info!("shutting down, cancelling {} workers", self.workers.len());
        for worker in self.workers.values() {
            worker.token.cancel();
        }
        for (_, worker) in self.workers.drain() {
            let _ = worker.handle.await;
        }
    }

    async fn reconcile(&mut self, token: &CancellationToken) {
        let active = match self.store.get_active_agents(token).await {
            Ok(agents) => agents,
            Err(e) => {
                error!(error = %e, "reconcile failed to fetch active agents, retrying next cycle");
                return;
            }
        };

        let desired: HashMap<Uuid, _> = active.into_iter().map(|a| (a.id, a)).collect();

        let to_stop: Vec<Uuid> = self
            .workers
            .keys()
            .filter(|id| !desired.contains_key(id))
            .copied()
            .collect();
        for id in to_stop {
            if let Some(worker) = self.workers.remove(&id) {
                worker.token.cancel();
                info!(agent_id = %id, "worker removed from active set, cancelling");
            }
        }

        let to_start: Vec<Uuid> = desired
            .keys()
            .filter(|id| !self.workers.contains_key(id))
            .copied()
            .collect();
        for id in to_start {
            let agent = desired[&id].clone();
            let worker_token = token.child_token();
            let mut worker = AgentWorker::new(
                agent,
                self.store.clone(),
                self.broker.clone(),
                self.resolver.clone(),
                self.market_data.clone(),
                self.max_consecutive_errors,
            );
            let run_token = worker_token.clone();
            let handle = tokio::spawn(async move {
                worker.run(run_token).await;
            });
            info!(agent_id = %id, "worker scheduled");
            self.workers.insert(id, RunningWorker { token: worker_token, handle });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use gb_store::FakeAgentStore;
    use gb_types::agent::{Agent, AgentStatus, Timeframe};
    use gb_types::bar::BarData;
    use rust_decimal_macros::dec;

    struct EmptyMarketData;

    #[async_trait]
    impl MarketDataClient for EmptyMarketData {
        async fn get_bar_data(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _start: chrono::DateTime<Utc>,
            _end: chrono::DateTime<Utc>,
        ) -> Result<Vec<BarData>, String> {
            Ok(vec![])
        }
    }

    fn agent(id: Uuid) -> Agent {
        Agent {
            id,
            account_id: "acct-1".to_string(),
            symbol: "AAPL".to_string(),
            strategy_id: Uuid::new_v4(),
            status: AgentStatus::Active,
            timeframe: Timeframe::OneDay,
            interval_minutes: 15,
            lookback_days: 60,
            position_size_dollars: dec!(1000),
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

    async fn closed_clock_mock(server: &mut mockito::Server) {
        server
            .mock("GET", "/v2/clock")
            .with_status(200)
            .with_body(r#"{"timestamp":"2026-07-30T02:00:00Z","is_open":false,"next_open":"2026-07-30T13:30:00Z","next_close":"2026-07-30T20:00:00Z"}"#)
            .create_async()
            .await;
    }

    fn orchestrator(server_url: &str, store: Arc<FakeAgentStore>) -> Orchestrator<FakeAgentStore> {
        let broker = Arc::new(BrokerClient::new(server_url, "key-id", "secret-key"));
        let resolver = Arc::new(StrategyResolver::new(store.clone()));
        Orchestrator::new(store, broker, resolver, Arc::new(EmptyMarketData), 5, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn reconcile_spawns_worker_for_active_agent_and_cancels_when_removed() {
        let mut server = mockito::Server::new_async().await;
        closed_clock_mock(&mut server).await;

        let id = Uuid::new_v4();
        let store = Arc::new(FakeAgentStore::new(vec![agent(id)], vec![]));
        let mut orch = orchestrator(&server.url(), store.clone());
        let token = CancellationToken::new();

        orch.reconcile(&token).await;
        assert_eq!(orch.workers.len(), 1);
        assert!(orch.workers.contains_key(&id));

        store.agents.lock().unwrap().clear();
        orch.reconcile(&token).await;
        assert_eq!(orch.workers.len(), 0, "worker should be cancelled and removed once the agent is no longer active");

        token.cancel();
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_for_an_unchanged_active_set() {
        let mut server = mockito::Server::new_async().await;
        closed_clock_mock(&mut server).await;

        let id = Uuid::new_v4();
        let store = Arc::new(FakeAgentStore::new(vec![agent(id)], vec![]));
        let mut orch = orchestrator(&server.url(), store);
        let token = CancellationToken::new();

        orch.reconcile(&token).await;
        let first_run: Vec<Uuid> = orch.workers.keys().copied().collect();

        orch.reconcile(&token).await;
        let second_run: Vec<Uuid> = orch.workers.keys().copied().collect();

        assert_eq!(first_run, second_run);
        assert_eq!(orch.workers.len(), 1);

        token.cancel();
    }
}

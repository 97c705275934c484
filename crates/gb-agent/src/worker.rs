use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use gb_broker::{BrokerClient, OrderRequest, OrderSide};
use gb_store::AgentStore;
use gb_strategy::StrategyResolver;
use gb_types::activity::Severity;
use gb_types::agent::{Agent, AgentStatus, PositionDirection, PositionState};
use gb_types::order_record::{client_order_id, OrderRecord};
use gb_types::orders::Side;
use gb_types::signal::SignalAction;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::WorkerError;
use crate::market_data::MarketDataClient;

/// Drives one agent's periodic trading loop: market-open gate, strategy
/// resolution, bar fetch, signal evaluation, order execution, bookkeeping.
pub struct AgentWorker<S: AgentStore> {
    agent: Agent,
    store: Arc<S>,
    broker: Arc<BrokerClient>,
    resolver: Arc<StrategyResolver<S>>,
    market_data: Arc<dyn MarketDataClient>,
    max_consecutive_errors: i32,
}

/// What step 6 (execution) actually did, distinct from whether it ran at all:
/// a completed dispatch always reaches step 7, a skip bypasses it entirely
/// (market closed, too few bars).
enum TickOutcome {
    Completed { signal_name: &'static str },
    Skipped,
}

impl<S: AgentStore> AgentWorker<S> {
    pub fn new(
        agent: Agent,
        store: Arc<S>,
        broker: Arc<BrokerClient>,
        resolver: Arc<StrategyResolver<S>>,
        market_data: Arc<dyn MarketDataClient>,
        max_consecutive_errors: i32,
    ) -> Self {
        Self {
            agent,
            store,
            broker,
            resolver,
            market_data,
            max_consecutive_errors,
        }
    }

    #[instrument(skip(self, token), fields(agent_id = %self.agent.id, symbol = %self.agent.symbol))]
    pub async fn run(&mut self, token: CancellationToken) {
        let _ = self
            .store
            .log(
                self.agent.id,
                &self.agent.account_id,
                "loop_started",
                &format!("worker started for {}", self.agent.symbol),
                None,
                Severity::Info,
                &token,
            )
            .await;
        info!("agent worker started");

        self.tick(&token).await;

        let interval = std::time::Duration::from_secs((self.agent.interval_minutes.max(1) as u64) * 60);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    self.tick(&token).await;
                }
            }
        }

        let _ = self
            .store
            .log(
                self.agent.id,
                &self.agent.account_id,
                "loop_stopped",
                "worker stopped",
                None,
                Severity::Info,
                &token,
            )
            .await;
        info!("agent worker stopped");
    }

    async fn tick(&mut self, token: &CancellationToken) {
        match self.try_tick(token).await {
            Ok(TickOutcome::Completed { signal_name }) => {
                if let Err(e) = self.store.update_last_run(self.agent.id, Utc::now(), signal_name, token).await {
                    self.handle_error(WorkerError::Store(e), token).await;
                    return;
                }
                self.agent.consecutive_errors = 0;
                self.agent.error_message = None;
                self.agent.last_signal = Some(signal_name.to_string());
            }
            Ok(TickOutcome::Skipped) => {}
            Err(e) => {
                if e.is_cancellation() {
                    return;
                }
                self.handle_error(e, token).await;
            }
        }
    }

    async fn try_tick(&mut self, token: &CancellationToken) -> Result<TickOutcome, WorkerError> {
        // Step 1: market-open gate.
        let clock = self.broker.get_clock(token).await?;
        if !clock.is_open {
            debug!(next_open = %clock.next_open, "market closed, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        // Step 2: strategy resolution.
        let def = self.resolver.resolve(self.agent.strategy_id, token).await?;

        // Step 3: bar fetch.
        let end = Utc::now();
        let start = end - ChronoDuration::days(self.agent.lookback_days);
        let bars = self
            .market_data
            .get_bar_data(&self.agent.symbol, self.agent.timeframe, start, end)
            .await
            .map_err(WorkerError::MarketData)?;
        if bars.len() < 2 {
            debug!(bar_count = bars.len(), "insufficient bar history, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        // Step 4: position load.
        let position = self.agent.current_position.clone().filter(|p| p.is_open());

        // Step 5: signal evaluation.
        let signal = gb_strategy::evaluate(&bars, &def, position.as_ref());
        let Some(signal) = signal else {
            return Ok(TickOutcome::Completed { signal_name: "none" });
        };

        // Step 6: execution.
        let last_bar = bars.last().expect("checked len >= 2 above");
        let signal_name = signal.action.as_str();
        match signal.action {
            SignalAction::EntryLong | SignalAction::EntryShort => {
                if position.is_some() {
                    warn!("entry signal while already in position, ignoring");
                    return Ok(TickOutcome::Completed { signal_name });
                }
                self.execute_entry(signal.action, last_bar, bars.len(), &def, token).await?;
            }
            SignalAction::ExitLong | SignalAction::ExitShort => {
                if position.is_none() {
                    warn!("exit signal while flat, ignoring");
                    return Ok(TickOutcome::Completed { signal_name });
                }
                self.execute_exit(token).await?;
            }
        }

        // `SignalAction` is exhaustive and validated at deserialization, so
        // there is no runtime "unknown action" branch to dispatch on here;
        // `WorkerError::UnknownAction` exists for the evaluator/store layer.
        Ok(TickOutcome::Completed { signal_name })
    }

    async fn execute_entry(
        &mut self,
        action: SignalAction,
        last_bar: &gb_types::bar::BarData,
        bars_used: usize,
        def: &gb_strategy::StrategyDef,
        token: &CancellationToken,
    ) -> Result<(), WorkerError> {
        let price = Decimal::try_from(last_bar.bar.close).unwrap_or(Decimal::ZERO);
        if price <= Decimal::ZERO {
            warn!("non-positive last close, skipping entry");
            return Ok(());
        }
        let qty = (self.agent.position_size_dollars / price).floor();
        if qty < Decimal::ONE {
            warn!(%qty, "position size too small for a single share, skipping entry");
            return Ok(());
        }

        let is_long = matches!(action, SignalAction::EntryLong);
        let side = if is_long { OrderSide::Buy } else { OrderSide::Sell };
        let coid = client_order_id(self.agent.id, Utc::now().timestamp_millis());

        let mut req = OrderRequest::market_day(self.agent.symbol.clone(), side, qty, coid);
        let atr = last_bar.indicator("atr_14");
        let mut bracket_atr = None;
        if let Some(atr) = atr {
            if def.atr_target_mult > Decimal::ZERO || def.atr_stop_mult > Decimal::ZERO {
                if let Some(atr_dec) = Decimal::from_f64(atr) {
                    let (tp, sl) = BrokerClient::bracket_prices(price, atr_dec, def.atr_target_mult, def.atr_stop_mult, is_long);
                    req = req.with_bracket(tp, sl);
                    bracket_atr = Some(atr_dec);
                }
            }
        }

        let resp = self.broker.submit_order(&req, token).await?;

        let direction = if is_long { PositionDirection::Long } else { PositionDirection::Short };
        let record = OrderRecord {
            agent_id: self.agent.id,
            account_id: self.agent.account_id.clone(),
            symbol: self.agent.symbol.clone(),
            side: if is_long { Side::Buy } else { Side::Sell },
            quantity: qty,
            order_type: "market".to_string(),
            client_order_id: resp.client_order_id.clone(),
            broker_order_id: Some(resp.id.clone()),
            status: resp.status.clone(),
            signal_direction: Some(direction),
            signal_metadata: serde_json::json!({
                "signal": action.as_str(),
                "price": price,
                "atr": bracket_atr,
                "bars_used": bars_used,
            }),
            submitted_at: Utc::now(),
        };
        self.store.create_order(&record, token).await?;

        let position = PositionState {
            direction,
            qty,
            entry_price: price,
            entry_time: Utc::now(),
            order_id: resp.id.clone(),
        };
        self.store.update_current_position(self.agent.id, Some(&position), token).await?;
        self.agent.current_position = Some(position);

        let _ = self
            .store
            .log(
                self.agent.id,
                &self.agent.account_id,
                "order_submitted",
                &format!("{} {} @ {}", action.as_str(), qty, price),
                None,
                Severity::Info,
                token,
            )
            .await;

        Ok(())
    }

    async fn execute_exit(&mut self, token: &CancellationToken) -> Result<(), WorkerError> {
        self.broker.close_position(&self.agent.symbol, token).await?;
        self.store.update_current_position(self.agent.id, None, token).await?;
        self.agent.current_position = None;

        let _ = self
            .store
            .log(
                self.agent.id,
                &self.agent.account_id,
                "position_closed",
                &format!("closed position in {}", self.agent.symbol),
                None,
                Severity::Info,
                token,
            )
            .await;

        Ok(())
    }

    async fn handle_error(&mut self, err: WorkerError, token: &CancellationToken) {
        error!(agent_id = %self.agent.id, error = %err, "tick failed");
        let count = match self.store.increment_errors(self.agent.id, &err.to_string(), token).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to record error on agent row");
                return;
            }
        };
        self.agent.consecutive_errors = count;
        self.agent.error_message = Some(err.to_string());

        let _ = self
            .store
            .log(
                self.agent.id,
                &self.agent.account_id,
                "error",
                &format!("Error ({}/{}): {}", count, self.max_consecutive_errors, err),
                None,
                Severity::Error,
                token,
            )
            .await;

        if count >= self.max_consecutive_errors {
            if let Err(e) = self.store.set_status(self.agent.id, AgentStatus::Error, token).await {
                error!(error = %e, "failed to transition agent to error status");
                return;
            }
            self.agent.status = AgentStatus::Error;
            let _ = self
                .store
                .log(
                    self.agent.id,
                    &self.agent.account_id,
                    "status_change",
                    "agent quarantined after exceeding max consecutive errors",
                    None,
                    Severity::Error,
                    token,
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gb_store::FakeAgentStore;
    use gb_types::agent::Timeframe;
    use gb_types::bar::{BarData, BarPoint};
    use gb_types::strategy_row::{StrategyDirection, StrategyRow};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FixedMarketData {
        bars: Vec<BarData>,
    }

    #[async_trait]
    impl MarketDataClient for FixedMarketData {
        async fn get_bar_data(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _start: chrono::DateTime<Utc>,
            _end: chrono::DateTime<Utc>,
        ) -> Result<Vec<BarData>, String> {
            Ok(self.bars.clone())
        }
    }

    fn bar(close: f64, atr: Option<f64>, trigger: f64) -> BarData {
        let mut indicators = HashMap::new();
        indicators.insert("trigger".to_string(), trigger);
        if let Some(atr) = atr {
            indicators.insert("atr_14".to_string(), atr);
        }
        BarData {
            bar: BarPoint {
                timestamp: Utc::now(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            },
            indicators,
        }
    }

    fn entry_exit_strategy_row(id: Uuid) -> StrategyRow {
        StrategyRow {
            id,
            name: "toggle".to_string(),
            display_name: "Toggle".to_string(),
            category: "test".to_string(),
            direction: StrategyDirection::LongOnly,
            atr_stop_mult: Some(dec!(2)),
            atr_target_mult: Some(dec!(3)),
            trailing_atr_mult: None,
            time_stop_bars: None,
            is_predefined: false,
            source_strategy_id: None,
            entry_long: Some(serde_json::json!({"kind":"compare","indicator":"trigger","op":"gt","value":0.5})),
            entry_short: None,
            exit_long: Some(serde_json::json!({"kind":"compare","indicator":"trigger","op":"lt","value":0.5})),
            exit_short: None,
            version: 1,
        }
    }

    fn base_agent(id: Uuid, strategy_id: Uuid) -> Agent {
        Agent {
            id,
            account_id: "acct-1".to_string(),
            symbol: "AAPL".to_string(),
            strategy_id,
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

    fn setup(agent: Agent, strategy_row: StrategyRow, server_url: &str, bars: Vec<BarData>) -> AgentWorker<FakeAgentStore> {
        let store = Arc::new(FakeAgentStore::new(vec![agent.clone()], vec![strategy_row]));
        let broker = Arc::new(BrokerClient::new(server_url, "key-id", "secret-key"));
        let resolver = Arc::new(StrategyResolver::new(store.clone()));
        let market_data = Arc::new(FixedMarketData { bars });
        AgentWorker::new(agent, store, broker, resolver, market_data, 3)
    }

    #[tokio::test]
    async fn happy_entry_submits_bracket_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/clock")
            .with_status(200)
            .with_body(r#"{"timestamp":"2026-07-30T14:00:00Z","is_open":true,"next_open":"2026-07-31T13:30:00Z","next_close":"2026-07-30T20:00:00Z"}"#)
            .create_async()
            .await;
        let order_mock = server
            .mock("POST", "/v2/orders")
            .with_status(200)
            .with_body(r#"{"id":"broker-order-1","client_order_id":"agent-1","status":"accepted","symbol":"AAPL","side":"buy","submitted_at":"2026-07-30T14:00:00Z"}"#)
            .create_async()
            .await;

        let agent_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        let agent = base_agent(agent_id, strategy_id);
        let bars = vec![bar(95.0, Some(2.0), 0.0), bar(100.0, Some(2.0), 1.0)];
        let mut worker = setup(agent, entry_exit_strategy_row(strategy_id), &server.url(), bars);

        let token = CancellationToken::new();
        let outcome = worker.try_tick(&token).await.unwrap();
        order_mock.assert_async().await;

        match outcome {
            TickOutcome::Completed { signal_name } => assert_eq!(signal_name, "entry_long"),
            TickOutcome::Skipped => panic!("expected a completed tick"),
        }
        assert!(worker.agent.current_position.is_some());
        let position = worker.agent.current_position.as_ref().unwrap();
        assert_eq!(position.qty, dec!(10));
        assert_eq!(position.entry_price, dec!(100));
    }

    #[tokio::test]
    async fn exit_on_signal_closes_position() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/clock")
            .with_status(200)
            .with_body(r#"{"timestamp":"2026-07-30T14:00:00Z","is_open":true,"next_open":"2026-07-31T13:30:00Z","next_close":"2026-07-30T20:00:00Z"}"#)
            .create_async()
            .await;
        let close_mock = server
            .mock("DELETE", "/v2/positions/AAPL")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let agent_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        let mut agent = base_agent(agent_id, strategy_id);
        agent.current_position = Some(PositionState {
            direction: PositionDirection::Long,
            qty: dec!(10),
            entry_price: dec!(100),
            entry_time: Utc::now(),
            order_id: "broker-order-0".to_string(),
        });
        let bars = vec![bar(101.0, Some(2.0), 1.0), bar(100.0, Some(2.0), 0.0)];
        let mut worker = setup(agent, entry_exit_strategy_row(strategy_id), &server.url(), bars);

        let token = CancellationToken::new();
        let outcome = worker.try_tick(&token).await.unwrap();
        close_mock.assert_async().await;

        match outcome {
            TickOutcome::Completed { signal_name } => assert_eq!(signal_name, "exit_long"),
            TickOutcome::Skipped => panic!("expected a completed tick"),
        }
        assert!(worker.agent.current_position.is_none());
    }

    #[tokio::test]
    async fn market_closed_skips_tick_without_touching_error_budget() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/clock")
            .with_status(200)
            .with_body(r#"{"timestamp":"2026-07-30T02:00:00Z","is_open":false,"next_open":"2026-07-30T13:30:00Z","next_close":"2026-07-30T20:00:00Z"}"#)
            .create_async()
            .await;

        let agent_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        let agent = base_agent(agent_id, strategy_id);
        let bars = vec![bar(100.0, Some(2.0), 1.0), bar(100.0, Some(2.0), 1.0)];
        let mut worker = setup(agent, entry_exit_strategy_row(strategy_id), &server.url(), bars);

        let token = CancellationToken::new();
        let outcome = worker.try_tick(&token).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Skipped));
        assert_eq!(worker.agent.consecutive_errors, 0);
    }

    #[tokio::test]
    async fn insufficient_sizing_skips_order_but_still_completes_tick() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/clock")
            .with_status(200)
            .with_body(r#"{"timestamp":"2026-07-30T14:00:00Z","is_open":true,"next_open":"2026-07-31T13:30:00Z","next_close":"2026-07-30T20:00:00Z"}"#)
            .create_async()
            .await;

        let agent_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        let mut agent = base_agent(agent_id, strategy_id);
        agent.position_size_dollars = dec!(50);
        let bars = vec![bar(95.0, Some(2.0), 0.0), bar(100.0, Some(2.0), 1.0)];
        let mut worker = setup(agent, entry_exit_strategy_row(strategy_id), &server.url(), bars);

        let token = CancellationToken::new();
        let outcome = worker.try_tick(&token).await.unwrap();
        match outcome {
            TickOutcome::Completed { signal_name } => assert_eq!(signal_name, "entry_long"),
            TickOutcome::Skipped => panic!("expected a completed tick"),
        }
        assert!(worker.agent.current_position.is_none());
    }

    #[tokio::test]
    async fn error_budget_trips_agent_to_error_status_after_max_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/clock")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let agent_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        let agent = base_agent(agent_id, strategy_id);
        let bars = vec![bar(100.0, Some(2.0), 1.0), bar(100.0, Some(2.0), 1.0)];
        let mut worker = setup(agent, entry_exit_strategy_row(strategy_id), &server.url(), bars);
        let token = CancellationToken::new();

        for _ in 0..3 {
            worker.tick(&token).await;
        }

        assert_eq!(worker.agent.status, AgentStatus::Error);
        assert_eq!(worker.agent.consecutive_errors, 3);
    }
}

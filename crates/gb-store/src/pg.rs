use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gb_types::activity::Severity;
use gb_types::agent::{Agent, AgentStatus, PositionState};
use gb_types::order_record::OrderRecord;
use gb_types::strategy_row::StrategyRow;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::row::{agent_status_str, AgentRow, StrategyTableRow};
use crate::traits::AgentStore;

/// `AgentStore` backed by a Postgres connection pool.
pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Runs `fut` unless `token` trips first; database drivers have no native
/// cancellation hook, so this races the query against the token.
async fn guarded<T>(
    token: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
) -> StoreResult<T> {
    if token.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        res = fut => res.map_err(StoreError::from),
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn get_active_agents(&self, token: &CancellationToken) -> StoreResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = guarded(
            token,
            sqlx::query_as::<_, AgentRow>(
                "SELECT id, account_id, symbol, strategy_id, status, timeframe, interval_minutes, \
                 lookback_days, position_size_dollars, paper, last_run_at, last_signal, \
                 error_message, consecutive_errors, current_position, created_at, updated_at \
                 FROM agents WHERE status = 'active'",
            )
            .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter()
            .map(|r| r.into_agent().map_err(Into::into))
            .collect()
    }

    async fn get_agent(&self, id: Uuid, token: &CancellationToken) -> StoreResult<Agent> {
        let row: Option<AgentRow> = guarded(
            token,
            sqlx::query_as::<_, AgentRow>(
                "SELECT id, account_id, symbol, strategy_id, status, timeframe, interval_minutes, \
                 lookback_days, position_size_dollars, paper, last_run_at, last_signal, \
                 error_message, consecutive_errors, current_position, created_at, updated_at \
                 FROM agents WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?;
        match row {
            Some(r) => r.into_agent().map_err(Into::into),
            None => Err(StoreError::AgentNotFound(id)),
        }
    }

    async fn update_last_run(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        signal: &str,
        token: &CancellationToken,
    ) -> StoreResult<()> {
        guarded(
            token,
            sqlx::query(
                "UPDATE agents SET last_run_at = $2, last_signal = $3, consecutive_errors = 0, \
                 error_message = NULL, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(at)
            .bind(signal)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn update_current_position(
        &self,
        id: Uuid,
        position: Option<&PositionState>,
        token: &CancellationToken,
    ) -> StoreResult<()> {
        let json = match position {
            Some(p) => Some(serde_json::to_value(p).map_err(|e| StoreError::Decode(e.to_string()))?),
            None => None,
        };
        guarded(
            token,
            sqlx::query("UPDATE agents SET current_position = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(json)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn increment_errors(&self, id: Uuid, message: &str, token: &CancellationToken) -> StoreResult<i32> {
        let count: i32 = guarded(
            token,
            sqlx::query_scalar(
                "UPDATE agents SET consecutive_errors = consecutive_errors + 1, error_message = $2, \
                 updated_at = now() WHERE id = $1 RETURNING consecutive_errors",
            )
            .bind(id)
            .bind(message)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(count)
    }

    async fn set_status(&self, id: Uuid, status: AgentStatus, token: &CancellationToken) -> StoreResult<()> {
        guarded(
            token,
            sqlx::query("UPDATE agents SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(agent_status_str(status))
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn create_order(&self, record: &OrderRecord, token: &CancellationToken) -> StoreResult<()> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut tx = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(StoreError::Cancelled),
            tx = self.pool.begin() => tx?,
        };
        let side = match record.side {
            gb_types::orders::Side::Buy => "buy",
            gb_types::orders::Side::Sell => "sell",
        };
        sqlx::query(
            "INSERT INTO orders (agent_id, account_id, symbol, side, quantity, type, client_order_id, \
             broker_order_id, status, signal_metadata, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.agent_id)
        .bind(&record.account_id)
        .bind(&record.symbol)
        .bind(side)
        .bind(record.quantity)
        .bind(&record.order_type)
        .bind(&record.client_order_id)
        .bind(&record.broker_order_id)
        .bind(&record.status)
        .bind(&record.signal_metadata)
        .bind(record.submitted_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
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
        token: &CancellationToken,
    ) -> StoreResult<()> {
        let severity_str = match severity {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        };
        guarded(
            token,
            sqlx::query(
                "INSERT INTO activity_log (agent_id, account_id, kind, message, data, severity, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, now())",
            )
            .bind(agent_id)
            .bind(account_id)
            .bind(kind)
            .bind(message)
            .bind(data)
            .bind(severity_str)
            .execute(&self.pool),
        )
        .await?;
        crate::mirror_log_to_tracing(agent_id, kind, message, severity);
        Ok(())
    }

    async fn get_strategy(&self, id: Uuid, token: &CancellationToken) -> StoreResult<StrategyRow> {
        let row: Option<StrategyTableRow> = guarded(
            token,
            sqlx::query_as::<_, StrategyTableRow>(
                "SELECT id, name, display_name, category, direction, atr_stop_mult, atr_target_mult, \
                 trailing_atr_mult, time_stop_bars, is_predefined, source_strategy_id, entry_long, \
                 entry_short, exit_long, exit_short, version FROM strategies WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?;
        match row {
            Some(r) => r.into_strategy_row().map_err(Into::into),
            None => Err(StoreError::StrategyNotFound(id)),
        }
    }
}

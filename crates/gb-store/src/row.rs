use chrono::{DateTime, Utc};
use gb_types::agent::{Agent, AgentStatus, PositionDirection, PositionState, Timeframe};
use gb_types::strategy_row::{StrategyDirection, StrategyRow};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;

/// Raw `agents` table row, decoded into `gb_types::Agent` by `into_agent`.
#[derive(Debug, FromRow)]
pub struct AgentRow {
    pub id: Uuid,
    pub account_id: String,
    pub symbol: String,
    pub strategy_id: Uuid,
    pub status: String,
    pub timeframe: String,
    pub interval_minutes: i64,
    pub lookback_days: i64,
    pub position_size_dollars: Decimal,
    pub paper: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_signal: Option<String>,
    pub error_message: Option<String>,
    pub consecutive_errors: i32,
    pub current_position: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<AgentStatus, StoreError> {
    match s {
        "active" => Ok(AgentStatus::Active),
        "paused" => Ok(AgentStatus::Paused),
        "error" => Ok(AgentStatus::Error),
        other => Err(StoreError::Decode(format!("unknown agent status '{}'", other))),
    }
}

fn parse_timeframe(s: &str) -> Result<Timeframe, StoreError> {
    match s {
        "1Min" => Ok(Timeframe::OneMinute),
        "5Min" => Ok(Timeframe::FiveMinute),
        "15Min" => Ok(Timeframe::FifteenMinute),
        "1Hour" => Ok(Timeframe::OneHour),
        "1Day" => Ok(Timeframe::OneDay),
        other => Err(StoreError::Decode(format!("unknown timeframe '{}'", other))),
    }
}

fn parse_position(value: serde_json::Value) -> Result<PositionState, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode(format!("current_position: {}", e)))
}

impl AgentRow {
    pub fn into_agent(self) -> Result<Agent, StoreError> {
        let current_position = match self.current_position {
            Some(v) if !v.is_null() => Some(parse_position(v)?),
            _ => None,
        };
        Ok(Agent {
            id: self.id,
            account_id: self.account_id,
            symbol: self.symbol,
            strategy_id: self.strategy_id,
            status: parse_status(&self.status)?,
            timeframe: parse_timeframe(&self.timeframe)?,
            interval_minutes: self.interval_minutes,
            lookback_days: self.lookback_days,
            position_size_dollars: self.position_size_dollars,
            paper: self.paper,
            last_run_at: self.last_run_at,
            last_signal: self.last_signal,
            error_message: self.error_message,
            consecutive_errors: self.consecutive_errors,
            current_position,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn position_direction_str(d: PositionDirection) -> &'static str {
    match d {
        PositionDirection::Long => "long",
        PositionDirection::Short => "short",
    }
}

pub fn agent_status_str(s: AgentStatus) -> &'static str {
    match s {
        AgentStatus::Active => "active",
        AgentStatus::Paused => "paused",
        AgentStatus::Error => "error",
    }
}

/// Raw `strategies` table row, decoded into `gb_types::StrategyRow`.
#[derive(Debug, FromRow)]
pub struct StrategyTableRow {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub direction: String,
    pub atr_stop_mult: Option<Decimal>,
    pub atr_target_mult: Option<Decimal>,
    pub trailing_atr_mult: Option<Decimal>,
    pub time_stop_bars: Option<i32>,
    pub is_predefined: bool,
    pub source_strategy_id: Option<String>,
    pub entry_long: Option<serde_json::Value>,
    pub entry_short: Option<serde_json::Value>,
    pub exit_long: Option<serde_json::Value>,
    pub exit_short: Option<serde_json::Value>,
    pub version: i64,
}

fn parse_direction(s: &str) -> Result<StrategyDirection, StoreError> {
    match s {
        "long_only" => Ok(StrategyDirection::LongOnly),
        "short_only" => Ok(StrategyDirection::ShortOnly),
        "long_short" => Ok(StrategyDirection::LongShort),
        other => Err(StoreError::Decode(format!("unknown strategy direction '{}'", other))),
    }
}

impl StrategyTableRow {
    pub fn into_strategy_row(self) -> Result<StrategyRow, StoreError> {
        Ok(StrategyRow {
            id: self.id,
            name: self.name,
            display_name: self.display_name,
            category: self.category,
            direction: parse_direction(&self.direction)?,
            atr_stop_mult: self.atr_stop_mult,
            atr_target_mult: self.atr_target_mult,
            trailing_atr_mult: self.trailing_atr_mult,
            time_stop_bars: self.time_stop_bars,
            is_predefined: self.is_predefined,
            source_strategy_id: self.source_strategy_id,
            entry_long: self.entry_long,
            entry_short: self.entry_short,
            exit_long: self.exit_long,
            exit_short: self.exit_short,
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn decodes_flat_agent_row() {
        let row = AgentRow {
            id: Uuid::new_v4(),
            account_id: "acct-1".to_string(),
            symbol: "AAPL".to_string(),
            strategy_id: Uuid::new_v4(),
            status: "active".to_string(),
            timeframe: "1Day".to_string(),
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
        };
        let agent = row.into_agent().unwrap();
        assert!(agent.current_position.is_none());
        assert_eq!(agent.status, AgentStatus::Active);
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(parse_status("bogus").is_err());
    }
}

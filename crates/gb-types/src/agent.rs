use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Bar timeframe an agent trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1Min")]
    OneMinute,
    #[serde(rename = "5Min")]
    FiveMinute,
    #[serde(rename = "15Min")]
    FifteenMinute,
    #[serde(rename = "1Hour")]
    OneHour,
    #[serde(rename = "1Day")]
    OneDay,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::OneMinute => "1Min",
            Timeframe::FiveMinute => "5Min",
            Timeframe::FifteenMinute => "15Min",
            Timeframe::OneHour => "1Hour",
            Timeframe::OneDay => "1Day",
        };
        write!(f, "{}", s)
    }
}

/// The lifecycle state of an agent, as tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Paused,
    Error,
}

/// Long or short, for an open position or a resolved signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionDirection {
    Long,
    Short,
}

/// The agent's open position, if any. Absence of this value (or `qty == 0`)
/// means the agent is flat. At most one open position per agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub direction: PositionDirection,
    pub qty: Decimal,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub order_id: String,
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        self.qty > Decimal::ZERO
    }
}

/// A user-declared intent to trade one symbol with one strategy on a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub account_id: String,
    pub symbol: String,
    pub strategy_id: Uuid,
    pub status: AgentStatus,
    pub timeframe: Timeframe,
    pub interval_minutes: i64,
    pub lookback_days: i64,
    pub position_size_dollars: Decimal,
    pub paper: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_signal: Option<String>,
    pub error_message: Option<String>,
    pub consecutive_errors: i32,
    pub current_position: Option<PositionState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// The agent is flat when it carries no position or a non-positive quantity.
    pub fn is_flat(&self) -> bool {
        match &self.current_position {
            Some(p) => !p.is_open(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_display_matches_wire_names() {
        assert_eq!(Timeframe::OneMinute.to_string(), "1Min");
        assert_eq!(Timeframe::OneDay.to_string(), "1Day");
    }

    #[test]
    fn flat_when_position_absent() {
        let agent = Agent {
            id: Uuid::new_v4(),
            account_id: "acct-1".to_string(),
            symbol: "AAPL".to_string(),
            strategy_id: Uuid::new_v4(),
            status: AgentStatus::Active,
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
        };
        assert!(agent.is_flat());
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side(s) a strategy is allowed to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyDirection {
    LongOnly,
    ShortOnly,
    LongShort,
}

impl StrategyDirection {
    pub fn allows_long(&self) -> bool {
        matches!(self, StrategyDirection::LongOnly | StrategyDirection::LongShort)
    }

    pub fn allows_short(&self) -> bool {
        matches!(self, StrategyDirection::ShortOnly | StrategyDirection::LongShort)
    }
}

/// The source-of-truth record for a strategy. Exactly one of three cases
/// holds: pure predefined, cloned, or custom — see `origin()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRow {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub direction: StrategyDirection,
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

/// The three origin classes a `StrategyRow` can be in, per its invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyOrigin {
    /// `source_strategy_id` set, `is_predefined` true.
    Predefined,
    /// `source_strategy_id` set, `is_predefined` false: conditions inherited,
    /// parameters overridable.
    Cloned,
    /// `source_strategy_id` unset: conditions come from the DSL columns.
    Custom,
}

impl StrategyRow {
    pub fn origin(&self) -> StrategyOrigin {
        match (&self.source_strategy_id, self.is_predefined) {
            (Some(_), true) => StrategyOrigin::Predefined,
            (Some(_), false) => StrategyOrigin::Cloned,
            (None, _) => StrategyOrigin::Custom,
        }
    }
}

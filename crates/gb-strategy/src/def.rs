use std::collections::HashSet;

use gb_types::strategy_row::StrategyDirection;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::condition::CompiledPredicate;

/// The in-memory, ready-to-evaluate form of a strategy.
#[derive(Clone)]
pub struct StrategyDef {
    pub id: Uuid,
    pub name: String,
    pub direction: StrategyDirection,
    pub atr_stop_mult: Decimal,
    pub atr_target_mult: Decimal,
    pub trailing_atr_mult: Decimal,
    pub time_stop_bars: i32,
    pub entry_long: Vec<CompiledPredicate>,
    pub entry_short: Vec<CompiledPredicate>,
    pub exit_long: Vec<CompiledPredicate>,
    pub exit_short: Vec<CompiledPredicate>,
    pub required_indicators: HashSet<String>,
}

impl std::fmt::Debug for StrategyDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("entry_long", &self.entry_long.len())
            .field("entry_short", &self.entry_short.len())
            .field("exit_long", &self.exit_long.len())
            .field("exit_short", &self.exit_short.len())
            .field("required_indicators", &self.required_indicators)
            .finish()
    }
}

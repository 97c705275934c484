use std::collections::{HashMap, HashSet};

use gb_types::strategy_row::StrategyDirection;
use rust_decimal::Decimal;

use crate::condition::{compile, CompiledPredicate};

/// A built-in strategy, identity-free: the resolver stamps identity fields
/// (id, name) and, for the cloned case, overrides from the row on top.
#[derive(Clone)]
pub struct StrategyTemplate {
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

/// Built-in strategy definitions keyed by `source_strategy_id`.
pub struct Registry {
    templates: HashMap<String, StrategyTemplate>,
}

fn compiled(json: serde_json::Value) -> CompiledPredicate {
    compile(&json).expect("built-in registry conditions always compile")
}

impl Registry {
    pub fn get(&self, source_strategy_id: &str) -> Option<&StrategyTemplate> {
        self.templates.get(source_strategy_id)
    }

    pub fn insert(&mut self, source_strategy_id: impl Into<String>, template: StrategyTemplate) {
        self.templates.insert(source_strategy_id.into(), template);
    }

    /// The built-ins shipped with the fleet: a mean-reversion RSI strategy
    /// and a moving-average crossover, matching the shape the teacher's
    /// strategy library uses for indicator thresholds.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();

        templates.insert(
            "rsi_reversion".to_string(),
            StrategyTemplate {
                direction: StrategyDirection::LongOnly,
                atr_stop_mult: Decimal::from(2),
                atr_target_mult: Decimal::from(3),
                trailing_atr_mult: Decimal::ZERO,
                time_stop_bars: 0,
                entry_long: vec![compiled(serde_json::json!({
                    "kind": "compare", "indicator": "rsi_14", "op": "lt", "value": 30.0
                }))],
                entry_short: vec![],
                exit_long: vec![compiled(serde_json::json!({
                    "kind": "compare", "indicator": "rsi_14", "op": "gt", "value": 70.0
                }))],
                exit_short: vec![],
                required_indicators: ["rsi_14".to_string()].into_iter().collect(),
            },
        );

        templates.insert(
            "sma_crossover".to_string(),
            StrategyTemplate {
                direction: StrategyDirection::LongShort,
                atr_stop_mult: Decimal::new(15, 1),
                atr_target_mult: Decimal::new(25, 1),
                trailing_atr_mult: Decimal::ZERO,
                time_stop_bars: 0,
                entry_long: vec![compiled(serde_json::json!({
                    "kind": "compare", "indicator": "sma_cross", "op": "cross_above", "value": 0.0
                }))],
                entry_short: vec![compiled(serde_json::json!({
                    "kind": "compare", "indicator": "sma_cross", "op": "cross_below", "value": 0.0
                }))],
                exit_long: vec![compiled(serde_json::json!({
                    "kind": "compare", "indicator": "sma_cross", "op": "cross_below", "value": 0.0
                }))],
                exit_short: vec![compiled(serde_json::json!({
                    "kind": "compare", "indicator": "sma_cross", "op": "cross_above", "value": 0.0
                }))],
                required_indicators: ["sma_cross".to_string()].into_iter().collect(),
            },
        );

        Self { templates }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_rsi_reversion() {
        let registry = Registry::builtin();
        assert!(registry.get("rsi_reversion").is_some());
        assert!(registry.get("does_not_exist").is_none());
    }
}

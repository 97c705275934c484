use std::collections::HashSet;
use std::sync::Arc;

use gb_store::AgentStore;
use gb_types::strategy_row::{StrategyOrigin, StrategyRow};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::condition::{collect_indicators, compile};
use crate::def::StrategyDef;
use crate::error::ResolverError;
use crate::registry::Registry;

struct CacheEntry {
    def: Arc<StrategyDef>,
    version: i64,
}

/// Materializes compiled `StrategyDef`s from `StrategyRow`s, caching by
/// `(id, version)` behind a single shared lock. Readers never block each
/// other; a stale read simply triggers a redundant (but harmless) rebuild.
pub struct StrategyResolver<S> {
    store: Arc<S>,
    registry: Registry,
    cache: RwLock<std::collections::HashMap<Uuid, CacheEntry>>,
}

impl<S: AgentStore> StrategyResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_registry(store, Registry::builtin())
    }

    pub fn with_registry(store: Arc<S>, registry: Registry) -> Self {
        Self {
            store,
            registry,
            cache: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub async fn resolve(&self, id: Uuid, token: &CancellationToken) -> Result<Arc<StrategyDef>, ResolverError> {
        let row = self.store.get_strategy(id, token).await?;

        if let Some(entry) = self.cache.read().get(&id) {
            if entry.version == row.version {
                return Ok(entry.def.clone());
            }
        }

        let def = Arc::new(self.materialize(&row)?);
        self.cache.write().insert(
            id,
            CacheEntry {
                def: def.clone(),
                version: row.version,
            },
        );
        Ok(def)
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    fn materialize(&self, row: &StrategyRow) -> Result<StrategyDef, ResolverError> {
        match row.origin() {
            StrategyOrigin::Predefined => self.materialize_predefined(row),
            StrategyOrigin::Cloned => self.materialize_cloned(row),
            StrategyOrigin::Custom => self.materialize_custom(row),
        }
    }

    fn materialize_predefined(&self, row: &StrategyRow) -> Result<StrategyDef, ResolverError> {
        let source_id = row.source_strategy_id.as_deref().expect("predefined rows carry source_strategy_id");
        let template = self
            .registry
            .get(source_id)
            .ok_or_else(|| ResolverError::StrategyMissing {
                strategy_id: row.id,
                source_strategy_id: source_id.to_string(),
            })?;
        Ok(StrategyDef {
            id: row.id,
            name: row.name.clone(),
            direction: template.direction,
            atr_stop_mult: template.atr_stop_mult,
            atr_target_mult: template.atr_target_mult,
            trailing_atr_mult: template.trailing_atr_mult,
            time_stop_bars: template.time_stop_bars,
            entry_long: template.entry_long.clone(),
            entry_short: template.entry_short.clone(),
            exit_long: template.exit_long.clone(),
            exit_short: template.exit_short.clone(),
            required_indicators: template.required_indicators.clone(),
        })
    }

    fn materialize_cloned(&self, row: &StrategyRow) -> Result<StrategyDef, ResolverError> {
        let source_id = row.source_strategy_id.as_deref().expect("cloned rows carry source_strategy_id");
        let template = self
            .registry
            .get(source_id)
            .ok_or_else(|| ResolverError::StrategyMissing {
                strategy_id: row.id,
                source_strategy_id: source_id.to_string(),
            })?;
        let zero_if_unset = |v: Option<Decimal>, fallback: Decimal| v.unwrap_or(fallback);
        Ok(StrategyDef {
            id: row.id,
            name: row.name.clone(),
            direction: row.direction,
            atr_stop_mult: zero_if_unset(row.atr_stop_mult, template.atr_stop_mult),
            atr_target_mult: zero_if_unset(row.atr_target_mult, template.atr_target_mult),
            trailing_atr_mult: zero_if_unset(row.trailing_atr_mult, template.trailing_atr_mult),
            time_stop_bars: row.time_stop_bars.unwrap_or(template.time_stop_bars),
            entry_long: template.entry_long.clone(),
            entry_short: template.entry_short.clone(),
            exit_long: template.exit_long.clone(),
            exit_short: template.exit_short.clone(),
            required_indicators: template.required_indicators.clone(),
        })
    }

    fn materialize_custom(&self, row: &StrategyRow) -> Result<StrategyDef, ResolverError> {
        let mut required_indicators = HashSet::new();
        let compile_tree = |tree: &Option<serde_json::Value>, name: &'static str| -> Result<Vec<crate::condition::CompiledPredicate>, ResolverError> {
            match tree {
                None => Ok(vec![]),
                Some(json) => {
                    let pred = compile(json).map_err(|e| ResolverError::StrategyCompileError {
                        strategy_id: row.id,
                        tree: name,
                        reason: e.to_string(),
                    })?;
                    Ok(vec![pred])
                }
            }
        };

        for (tree, name) in [
            (&row.entry_long, "entry_long"),
            (&row.entry_short, "entry_short"),
            (&row.exit_long, "exit_long"),
            (&row.exit_short, "exit_short"),
        ] {
            if let Some(json) = tree {
                collect_indicators(json, &mut required_indicators).map_err(|e| ResolverError::StrategyCompileError {
                    strategy_id: row.id,
                    tree: name,
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(StrategyDef {
            id: row.id,
            name: row.name.clone(),
            direction: row.direction,
            atr_stop_mult: row.atr_stop_mult.unwrap_or(Decimal::ZERO),
            atr_target_mult: row.atr_target_mult.unwrap_or(Decimal::ZERO),
            trailing_atr_mult: row.trailing_atr_mult.unwrap_or(Decimal::ZERO),
            time_stop_bars: row.time_stop_bars.unwrap_or(0),
            entry_long: compile_tree(&row.entry_long, "entry_long")?,
            entry_short: compile_tree(&row.entry_short, "entry_short")?,
            exit_long: compile_tree(&row.exit_long, "exit_long")?,
            exit_short: compile_tree(&row.exit_short, "exit_short")?,
            required_indicators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_store::FakeAgentStore;
    use gb_types::strategy_row::StrategyDirection;

    fn custom_row(id: Uuid, version: i64) -> StrategyRow {
        StrategyRow {
            id,
            name: "my_custom".to_string(),
            display_name: "My Custom".to_string(),
            category: "custom".to_string(),
            direction: StrategyDirection::LongOnly,
            atr_stop_mult: None,
            atr_target_mult: None,
            trailing_atr_mult: None,
            time_stop_bars: None,
            is_predefined: false,
            source_strategy_id: None,
            entry_long: Some(serde_json::json!({"kind":"compare","indicator":"rsi_14","op":"lt","value":30.0})),
            entry_short: None,
            exit_long: Some(serde_json::json!({"kind":"compare","indicator":"rsi_14","op":"gt","value":70.0})),
            exit_short: None,
            version,
        }
    }

    #[tokio::test]
    async fn resolves_custom_strategy_and_caches_by_version() {
        let row = custom_row(Uuid::new_v4(), 1);
        let id = row.id;
        let store = Arc::new(FakeAgentStore::new(vec![], vec![row]));
        let resolver = StrategyResolver::new(store);
        let token = CancellationToken::new();

        let def1 = resolver.resolve(id, &token).await.unwrap();
        assert_eq!(def1.entry_long.len(), 1);
        assert!(def1.required_indicators.contains("rsi_14"));

        let def2 = resolver.resolve(id, &token).await.unwrap();
        assert!(Arc::ptr_eq(&def1, &def2), "same version must hit the cache");
    }

    #[tokio::test]
    async fn version_bump_forces_recompile() {
        let mut row = custom_row(Uuid::new_v4(), 4);
        let id = row.id;
        let store = Arc::new(FakeAgentStore::new(vec![], vec![row.clone()]));
        let resolver = StrategyResolver::new(store.clone());
        let token = CancellationToken::new();

        let def_v4 = resolver.resolve(id, &token).await.unwrap();

        row.version = 5;
        row.atr_stop_mult = Some(Decimal::from(4));
        *store.strategies.lock().unwrap() = vec![row];

        let def_v5 = resolver.resolve(id, &token).await.unwrap();
        assert!(!Arc::ptr_eq(&def_v4, &def_v5));
        assert_eq!(def_v5.atr_stop_mult, Decimal::from(4));
    }

    #[tokio::test]
    async fn predefined_missing_source_fails() {
        let mut row = custom_row(Uuid::new_v4(), 1);
        row.is_predefined = true;
        row.source_strategy_id = Some("no_such_strategy".to_string());
        let id = row.id;
        let store = Arc::new(FakeAgentStore::new(vec![], vec![row]));
        let resolver = StrategyResolver::new(store);
        let err = resolver.resolve(id, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ResolverError::StrategyMissing { .. }));
    }
}

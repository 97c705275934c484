use std::collections::HashSet;
use std::sync::Arc;

use gb_types::bar::BarData;

use crate::error::CompileError;

/// A compiled condition: a predicate over the bar history, with the latest
/// bar at the end of the slice. Boxed so both built-in and DSL-compiled
/// conditions share one representation.
pub type CompiledPredicate = Arc<dyn Fn(&[BarData]) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    CrossAbove,
    CrossBelow,
}

impl CompareOp {
    fn parse(s: &str) -> Result<Self, CompileError> {
        match s {
            "lt" => Ok(CompareOp::Lt),
            "lte" => Ok(CompareOp::Lte),
            "gt" => Ok(CompareOp::Gt),
            "gte" => Ok(CompareOp::Gte),
            "eq" => Ok(CompareOp::Eq),
            "cross_above" => Ok(CompareOp::CrossAbove),
            "cross_below" => Ok(CompareOp::CrossBelow),
            other => Err(CompileError::UnknownKind { kind: other.to_string() }),
        }
    }
}

/// Compiles a JSON condition tree into a predicate.
///
/// Grammar (each node is a JSON object with a `"kind"` tag):
/// - `{"kind":"compare","indicator":"rsi_14","op":"lt","value":30.0}`
/// - `{"kind":"all","nodes":[...]}`
/// - `{"kind":"any","nodes":[...]}`
/// - `{"kind":"not","node":{...}}`
///
/// `cross_above`/`cross_below` compare the indicator's current value against
/// `value` while requiring the previous bar to have been on the other side.
pub fn compile(tree: &serde_json::Value) -> Result<CompiledPredicate, CompileError> {
    let obj = tree
        .as_object()
        .ok_or_else(|| CompileError::Malformed("node is not an object".to_string()))?;
    let kind = obj
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompileError::Malformed("missing 'kind'".to_string()))?;

    match kind {
        "compare" => compile_compare(obj),
        "all" => compile_combinator(obj, true),
        "any" => compile_combinator(obj, false),
        "not" => compile_not(obj),
        other => Err(CompileError::UnknownKind { kind: other.to_string() }),
    }
}

fn compile_compare(
    obj: &serde_json::Map<String, serde_json::Value>,
) -> Result<CompiledPredicate, CompileError> {
    let indicator = obj
        .get("indicator")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompileError::Malformed("compare node missing 'indicator'".to_string()))?
        .to_string();
    let op = CompareOp::parse(
        obj.get("op")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CompileError::Malformed("compare node missing 'op'".to_string()))?,
    )?;
    let value = obj
        .get("value")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CompileError::Malformed("compare node missing numeric 'value'".to_string()))?;

    Ok(Arc::new(move |bars: &[BarData]| {
        let Some(current) = bars.last().and_then(|b| b.indicator(&indicator)) else {
            return false;
        };
        match op {
            CompareOp::Lt => current < value,
            CompareOp::Lte => current <= value,
            CompareOp::Gt => current > value,
            CompareOp::Gte => current >= value,
            CompareOp::Eq => (current - value).abs() < f64::EPSILON,
            CompareOp::CrossAbove | CompareOp::CrossBelow => {
                let Some(prev) = bars.len().checked_sub(2).and_then(|i| bars.get(i)).and_then(|b| b.indicator(&indicator)) else {
                    return false;
                };
                match op {
                    CompareOp::CrossAbove => prev <= value && current > value,
                    CompareOp::CrossBelow => prev >= value && current < value,
                    _ => unreachable!(),
                }
            }
        }
    }))
}

fn compile_combinator(
    obj: &serde_json::Map<String, serde_json::Value>,
    all: bool,
) -> Result<CompiledPredicate, CompileError> {
    let nodes = obj
        .get("nodes")
        .and_then(|v| v.as_array())
        .ok_or_else(|| CompileError::Malformed("combinator node missing 'nodes' array".to_string()))?;
    let compiled: Vec<CompiledPredicate> = nodes.iter().map(compile).collect::<Result<_, _>>()?;
    Ok(Arc::new(move |bars: &[BarData]| {
        if all {
            compiled.iter().all(|p| p(bars))
        } else {
            compiled.iter().any(|p| p(bars))
        }
    }))
}

fn compile_not(obj: &serde_json::Map<String, serde_json::Value>) -> Result<CompiledPredicate, CompileError> {
    let inner = obj
        .get("node")
        .ok_or_else(|| CompileError::Malformed("not node missing 'node'".to_string()))?;
    let compiled = compile(inner)?;
    Ok(Arc::new(move |bars: &[BarData]| !compiled(bars)))
}

/// Collects the union of indicator names referenced anywhere in the tree.
pub fn collect_indicators(tree: &serde_json::Value, out: &mut HashSet<String>) -> Result<(), CompileError> {
    let obj = tree
        .as_object()
        .ok_or_else(|| CompileError::Malformed("node is not an object".to_string()))?;
    let kind = obj
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompileError::Malformed("missing 'kind'".to_string()))?;
    match kind {
        "compare" => {
            let indicator = obj
                .get("indicator")
                .and_then(|v| v.as_str())
                .ok_or_else(|| CompileError::Malformed("compare node missing 'indicator'".to_string()))?;
            out.insert(indicator.to_string());
            Ok(())
        }
        "all" | "any" => {
            let nodes = obj
                .get("nodes")
                .and_then(|v| v.as_array())
                .ok_or_else(|| CompileError::Malformed("combinator node missing 'nodes' array".to_string()))?;
            for node in nodes {
                collect_indicators(node, out)?;
            }
            Ok(())
        }
        "not" => {
            let inner = obj
                .get("node")
                .ok_or_else(|| CompileError::Malformed("not node missing 'node'".to_string()))?;
            collect_indicators(inner, out)
        }
        other => Err(CompileError::UnknownKind { kind: other.to_string() }),
    }
}

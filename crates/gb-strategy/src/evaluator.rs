use gb_types::agent::{PositionDirection, PositionState};
use gb_types::bar::BarData;
use gb_types::signal::{Signal, SignalAction};

use crate::condition::CompiledPredicate;
use crate::def::StrategyDef;

/// Runs a list of compiled predicates as an OR: any single match fires.
/// Used for exits, where any configured exit condition closes the position.
fn any_matches(predicates: &[CompiledPredicate], bars: &[BarData]) -> bool {
    predicates.iter().any(|p| run_predicate(p, bars))
}

/// Runs a list of compiled predicates as an AND: every condition must hold.
/// Used for entries. An empty list never triggers — a strategy with no
/// entry conditions on a side can never open a position on that side.
fn all_match(predicates: &[CompiledPredicate], bars: &[BarData]) -> bool {
    !predicates.is_empty() && predicates.iter().all(|p| run_predicate(p, bars))
}

/// A panicking predicate (a malformed user-authored indicator expression,
/// divide by zero in an indicator feed, etc.) is treated as a non-match
/// rather than taking the whole evaluation down with it.
fn run_predicate(pred: &CompiledPredicate, bars: &[BarData]) -> bool {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pred(bars))) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("strategy predicate panicked during evaluation, treating as false");
            false
        }
    }
}

/// Decides the next action for an agent given its bar history, compiled
/// strategy, and current position. Pure and side-effect free: callers are
/// responsible for acting on the returned signal.
///
/// - In position: checks the exit list for that side only (OR). The first
///   (and only) matching side can produce an exit signal.
/// - Flat: tries long entry first, then short, each gated by the strategy's
///   admissible direction. Entry conditions are ANDed.
pub fn evaluate(bars: &[BarData], def: &StrategyDef, position: Option<&PositionState>) -> Option<Signal> {
    if bars.is_empty() {
        return None;
    }

    if let Some(pos) = position.filter(|p| p.is_open()) {
        return match pos.direction {
            PositionDirection::Long if any_matches(&def.exit_long, bars) => Some(Signal {
                direction: PositionDirection::Long,
                action: SignalAction::ExitLong,
            }),
            PositionDirection::Short if any_matches(&def.exit_short, bars) => Some(Signal {
                direction: PositionDirection::Short,
                action: SignalAction::ExitShort,
            }),
            _ => None,
        };
    }

    if def.direction.allows_long() && all_match(&def.entry_long, bars) {
        return Some(Signal {
            direction: PositionDirection::Long,
            action: SignalAction::EntryLong,
        });
    }
    if def.direction.allows_short() && all_match(&def.entry_short, bars) {
        return Some(Signal {
            direction: PositionDirection::Short,
            action: SignalAction::EntryShort,
        });
    }
    None
}

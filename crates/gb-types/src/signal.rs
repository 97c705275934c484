use serde::{Deserialize, Serialize};

use crate::agent::PositionDirection;

/// What the evaluator decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    EntryLong,
    EntryShort,
    ExitLong,
    ExitShort,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::EntryLong => "entry_long",
            SignalAction::EntryShort => "entry_short",
            SignalAction::ExitLong => "exit_long",
            SignalAction::ExitShort => "exit_short",
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, SignalAction::EntryLong | SignalAction::EntryShort)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, SignalAction::ExitLong | SignalAction::ExitShort)
    }

    pub fn direction(&self) -> PositionDirection {
        match self {
            SignalAction::EntryLong | SignalAction::ExitLong => PositionDirection::Long,
            SignalAction::EntryShort | SignalAction::ExitShort => PositionDirection::Short,
        }
    }
}

/// Ephemeral output of `SignalEvaluator::evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: PositionDirection,
    pub action: SignalAction,
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

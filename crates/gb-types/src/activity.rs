use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an `ActivityEntry`, also used to pick the `tracing` level it
/// is mirrored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Append-only log record used for user-visible agent timelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub agent_id: Uuid,
    pub account_id: String,
    pub kind: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub severity: Severity,
}

impl ActivityEntry {
    pub fn new(
        agent_id: Uuid,
        account_id: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            agent_id,
            account_id: account_id.into(),
            kind: kind.into(),
            message: message.into(),
            data: None,
            severity,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

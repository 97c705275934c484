use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::PositionDirection;
use crate::orders::Side;

/// Persisted once per order submission attempt that reaches the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub agent_id: Uuid,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    #[serde(rename = "type")]
    pub order_type: String,
    pub client_order_id: String,
    pub broker_order_id: Option<String>,
    pub status: String,
    pub signal_direction: Option<PositionDirection>,
    pub signal_metadata: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

/// Builds the `client_order_id` recipe used to make submissions idempotent:
/// unique per `(agentId, submissionInstant)`.
pub fn client_order_id(agent_id: Uuid, monotonic_ms: i64) -> String {
    format!("agent-{}-{}", agent_id, monotonic_ms)
}

pub mod error;
pub mod fake;
pub mod pg;
pub mod row;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fake::FakeAgentStore;
pub use pg::PgAgentStore;
pub use traits::AgentStore;

use gb_types::activity::Severity;
use uuid::Uuid;

/// Mirrors an activity-log entry to `tracing` at the level matching its
/// severity, so operators can `grep` logs without querying the store.
/// Shared by every `AgentStore` implementation's `log` method.
pub(crate) fn mirror_log_to_tracing(agent_id: Uuid, kind: &str, message: &str, severity: Severity) {
    match severity {
        Severity::Info => tracing::info!(agent_id = %agent_id, kind, "{}", message),
        Severity::Warn => tracing::warn!(agent_id = %agent_id, kind, "{}", message),
        Severity::Error => tracing::error!(agent_id = %agent_id, kind, "{}", message),
    }
}

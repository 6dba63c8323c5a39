//! Append-only audit log
//!
//! Every state-changing engine operation records who did what. Records
//! are immutable; the store exposes no update or delete.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use core_kernel::AuditEventId;

use crate::error::EventsError;
use crate::ports::AuditStore;

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier
    pub id: AuditEventId,
    /// Who performed the action
    pub actor_id: String,
    /// Action name, such as `initiated_dunning`
    pub action: String,
    /// Free-form detail
    pub details: String,
    /// Server-generated timestamp
    pub recorded_at: DateTime<Utc>,
}

/// Service appending audit records
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Appends one record with a server-generated timestamp
    pub async fn record(
        &self,
        actor_id: &str,
        action: &str,
        details: &str,
    ) -> Result<AuditRecord, EventsError> {
        let record = AuditRecord {
            id: AuditEventId::new_v7(),
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            details: details.to_string(),
            recorded_at: Utc::now(),
        };
        self.store.append(record.clone()).await?;
        debug!(actor_id, action, "audit record appended");
        Ok(record)
    }
}

//! Events Domain Ports

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use core_kernel::{DomainPort, OutboxEntryId, PortError};

use crate::audit::AuditRecord;
use crate::outbox::OutboxEntry;

/// Append-only storage for audit records
#[async_trait]
pub trait AuditStore: DomainPort {
    /// Appends a record
    async fn append(&self, record: AuditRecord) -> Result<(), PortError>;

    /// All records for one actor, newest first
    async fn list_by_actor(&self, actor_id: &str) -> Result<Vec<AuditRecord>, PortError>;
}

/// Durable storage for outbox entries
#[async_trait]
pub trait OutboxStore: DomainPort {
    /// Persists a new entry
    async fn insert(&self, entry: OutboxEntry) -> Result<(), PortError>;

    /// Persists updated retry state
    async fn update(&self, entry: OutboxEntry) -> Result<(), PortError>;

    /// Pending entries due at `now`, oldest first
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<OutboxEntry>, PortError>;

    /// Dead-lettered entries, for operator inspection
    async fn list_dead(&self) -> Result<Vec<OutboxEntry>, PortError>;
}

/// Outbound notification adapter
///
/// Both calls are best-effort from the adapter's point of view; delivery
/// guarantees come from the outbox retry loop, not from this port.
#[async_trait]
pub trait NotificationPort: DomainPort {
    /// Delivers a JSON payload to a webhook target
    async fn send_webhook(&self, url: &str, payload: &Value) -> Result<(), PortError>;

    /// Sends a plain-text email
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), PortError>;
}

/// In-memory adapters for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::outbox::OutboxStatus;

    /// In-memory audit store
    #[derive(Debug, Default)]
    pub struct MemoryAuditStore {
        records: Arc<RwLock<Vec<AuditRecord>>>,
    }

    impl MemoryAuditStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// All records, in append order
        pub async fn records(&self) -> Vec<AuditRecord> {
            self.records.read().await.clone()
        }
    }

    impl DomainPort for MemoryAuditStore {}

    #[async_trait]
    impl AuditStore for MemoryAuditStore {
        async fn append(&self, record: AuditRecord) -> Result<(), PortError> {
            self.records.write().await.push(record);
            Ok(())
        }

        async fn list_by_actor(&self, actor_id: &str) -> Result<Vec<AuditRecord>, PortError> {
            let mut out: Vec<AuditRecord> = self
                .records
                .read()
                .await
                .iter()
                .filter(|r| r.actor_id == actor_id)
                .cloned()
                .collect();
            out.reverse();
            Ok(out)
        }
    }

    /// In-memory outbox store
    #[derive(Debug, Default)]
    pub struct MemoryOutboxStore {
        entries: Arc<RwLock<HashMap<OutboxEntryId, OutboxEntry>>>,
    }

    impl MemoryOutboxStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// One entry by ID
        pub async fn entry(&self, id: OutboxEntryId) -> Option<OutboxEntry> {
            self.entries.read().await.get(&id).cloned()
        }
    }

    impl DomainPort for MemoryOutboxStore {}

    #[async_trait]
    impl OutboxStore for MemoryOutboxStore {
        async fn insert(&self, entry: OutboxEntry) -> Result<(), PortError> {
            self.entries.write().await.insert(entry.id, entry);
            Ok(())
        }

        async fn update(&self, entry: OutboxEntry) -> Result<(), PortError> {
            let mut entries = self.entries.write().await;
            if !entries.contains_key(&entry.id) {
                return Err(PortError::not_found("OutboxEntry", entry.id));
            }
            entries.insert(entry.id, entry);
            Ok(())
        }

        async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<OutboxEntry>, PortError> {
            let mut due: Vec<OutboxEntry> = self
                .entries
                .read()
                .await
                .values()
                .filter(|e| e.is_due(now))
                .cloned()
                .collect();
            due.sort_by_key(|e| e.created_at);
            Ok(due)
        }

        async fn list_dead(&self) -> Result<Vec<OutboxEntry>, PortError> {
            Ok(self
                .entries
                .read()
                .await
                .values()
                .filter(|e| e.status == OutboxStatus::Dead)
                .cloned()
                .collect())
        }
    }

    /// Recording notifier that can be told to fail
    #[derive(Debug, Default)]
    pub struct MemoryNotifier {
        webhooks: Arc<RwLock<Vec<(String, Value)>>>,
        emails: Arc<RwLock<Vec<(String, String, String)>>>,
        failures_remaining: AtomicU32,
    }

    impl MemoryNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// The next `count` deliveries will fail with a connection error
        pub fn fail_next(&self, count: u32) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        /// Webhook deliveries seen so far
        pub async fn webhooks(&self) -> Vec<(String, Value)> {
            self.webhooks.read().await.clone()
        }

        /// Emails sent so far
        pub async fn emails(&self) -> Vec<(String, String, String)> {
            self.emails.read().await.clone()
        }

        fn should_fail(&self) -> bool {
            self.failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl DomainPort for MemoryNotifier {}

    #[async_trait]
    impl NotificationPort for MemoryNotifier {
        async fn send_webhook(&self, url: &str, payload: &Value) -> Result<(), PortError> {
            if self.should_fail() {
                return Err(PortError::connection("simulated webhook failure"));
            }
            self.webhooks
                .write()
                .await
                .push((url.to_string(), payload.clone()));
            Ok(())
        }

        async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), PortError> {
            if self.should_fail() {
                return Err(PortError::connection("simulated email failure"));
            }
            self.emails.write().await.push((
                to.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }
}

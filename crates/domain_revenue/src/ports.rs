//! Revenue Domain Ports

use async_trait::async_trait;

use core_kernel::{DeferredEntryId, DomainPort, Money, PortError, ReportingMonth};

use crate::entries::{DeferredRevenueEntry, RecognizedRevenueEntry};

/// Durable storage for recognized and deferred revenue
#[async_trait]
pub trait RevenueStore: DomainPort {
    /// Appends a recognized entry
    async fn insert_recognized(&self, entry: RecognizedRevenueEntry) -> Result<(), PortError>;

    /// Persists a new deferred entry
    async fn insert_deferred(&self, entry: DeferredRevenueEntry) -> Result<(), PortError>;

    /// Compare-and-swap update of a deferred entry
    async fn update_deferred(
        &self,
        entry: &DeferredRevenueEntry,
        expected_version: u64,
    ) -> Result<DeferredRevenueEntry, PortError>;

    /// Every deferred entry still amortizing
    async fn list_open_deferred(&self) -> Result<Vec<DeferredRevenueEntry>, PortError>;

    /// Whether a slice for (deferred entry, month) has already been drawn
    async fn slice_exists(
        &self,
        deferred_id: DeferredEntryId,
        month: ReportingMonth,
    ) -> Result<bool, PortError>;

    /// All recognized entries attributed to one month
    async fn list_recognized_in_month(
        &self,
        month: ReportingMonth,
    ) -> Result<Vec<RecognizedRevenueEntry>, PortError>;

    /// Unreleased balances of all open deferred entries
    async fn open_deferred_balances(&self) -> Result<Vec<Money>, PortError>;
}

/// In-memory adapter for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::entries::DeferredStatus;

    /// In-memory revenue store
    #[derive(Debug, Default)]
    pub struct MemoryRevenueStore {
        recognized: Arc<RwLock<Vec<RecognizedRevenueEntry>>>,
        deferred: Arc<RwLock<HashMap<DeferredEntryId, DeferredRevenueEntry>>>,
    }

    impl MemoryRevenueStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// All recognized entries, in insertion order
        pub async fn recognized_entries(&self) -> Vec<RecognizedRevenueEntry> {
            self.recognized.read().await.clone()
        }

        /// A deferred entry by ID
        pub async fn deferred_entry(&self, id: DeferredEntryId) -> Option<DeferredRevenueEntry> {
            self.deferred.read().await.get(&id).cloned()
        }
    }

    impl DomainPort for MemoryRevenueStore {}

    #[async_trait]
    impl RevenueStore for MemoryRevenueStore {
        async fn insert_recognized(
            &self,
            entry: RecognizedRevenueEntry,
        ) -> Result<(), PortError> {
            self.recognized.write().await.push(entry);
            Ok(())
        }

        async fn insert_deferred(&self, entry: DeferredRevenueEntry) -> Result<(), PortError> {
            self.deferred.write().await.insert(entry.id, entry);
            Ok(())
        }

        async fn update_deferred(
            &self,
            entry: &DeferredRevenueEntry,
            expected_version: u64,
        ) -> Result<DeferredRevenueEntry, PortError> {
            let mut deferred = self.deferred.write().await;
            let stored = deferred
                .get_mut(&entry.id)
                .ok_or_else(|| PortError::not_found("DeferredRevenueEntry", entry.id))?;

            if stored.version != expected_version {
                return Err(PortError::conflict(format!(
                    "deferred entry {}: expected version {}, found {}",
                    entry.id, expected_version, stored.version
                )));
            }

            let mut updated = entry.clone();
            updated.version = expected_version + 1;
            *stored = updated.clone();
            Ok(updated)
        }

        async fn list_open_deferred(&self) -> Result<Vec<DeferredRevenueEntry>, PortError> {
            let mut open: Vec<DeferredRevenueEntry> = self
                .deferred
                .read()
                .await
                .values()
                .filter(|e| e.status == DeferredStatus::Deferred)
                .cloned()
                .collect();
            open.sort_by_key(|e| e.created_at);
            Ok(open)
        }

        async fn slice_exists(
            &self,
            deferred_id: DeferredEntryId,
            month: ReportingMonth,
        ) -> Result<bool, PortError> {
            Ok(self
                .recognized
                .read()
                .await
                .iter()
                .any(|e| e.source_deferred == Some(deferred_id) && e.month == month))
        }

        async fn list_recognized_in_month(
            &self,
            month: ReportingMonth,
        ) -> Result<Vec<RecognizedRevenueEntry>, PortError> {
            Ok(self
                .recognized
                .read()
                .await
                .iter()
                .filter(|e| e.month == month)
                .cloned()
                .collect())
        }

        async fn open_deferred_balances(&self) -> Result<Vec<Money>, PortError> {
            self.deferred
                .read()
                .await
                .values()
                .filter(|e| e.status == DeferredStatus::Deferred)
                .map(|e| {
                    e.amount.checked_sub(&e.released_amount).map_err(|e| {
                        PortError::internal(format!("deferred balance underflow: {e}"))
                    })
                })
                .collect()
        }
    }
}

//! Payout Domain Ports

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use core_kernel::{DomainPort, PayoutBatchId, PayoutId, PortError};

use crate::payout::{Payout, PayoutBatch};

/// Durable storage for payouts and batches
#[async_trait]
pub trait PayoutStore: DomainPort {
    /// Persists a new payout
    async fn insert(&self, payout: Payout) -> Result<(), PortError>;

    /// Retrieves a payout by ID
    async fn get(&self, id: PayoutId) -> Result<Payout, PortError>;

    /// Compare-and-swap update
    async fn update(&self, payout: &Payout, expected_version: u64) -> Result<Payout, PortError>;

    /// Pending payouts whose scheduled time has arrived
    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Payout>, PortError>;

    /// Gross amounts of completed payouts, the fraud-screen history
    async fn completed_amounts(&self) -> Result<Vec<Decimal>, PortError>;

    /// Persists a new batch
    async fn insert_batch(&self, batch: PayoutBatch) -> Result<(), PortError>;

    /// Persists updated batch state
    async fn update_batch(&self, batch: PayoutBatch) -> Result<(), PortError>;

    /// Retrieves a batch by ID
    async fn get_batch(&self, id: PayoutBatchId) -> Result<PayoutBatch, PortError>;

    /// All payouts belonging to one batch
    async fn list_by_batch(&self, batch_id: PayoutBatchId) -> Result<Vec<Payout>, PortError>;
}

/// In-memory adapter for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::payout::PayoutStatus;

    /// In-memory payout store with CAS versioning
    #[derive(Debug, Default)]
    pub struct MemoryPayoutStore {
        payouts: Arc<RwLock<HashMap<PayoutId, Payout>>>,
        batches: Arc<RwLock<HashMap<PayoutBatchId, PayoutBatch>>>,
    }

    impl MemoryPayoutStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// All payouts, oldest first
        pub async fn all_payouts(&self) -> Vec<Payout> {
            let mut all: Vec<Payout> = self.payouts.read().await.values().cloned().collect();
            all.sort_by_key(|p| p.created_at);
            all
        }
    }

    impl DomainPort for MemoryPayoutStore {}

    #[async_trait]
    impl PayoutStore for MemoryPayoutStore {
        async fn insert(&self, payout: Payout) -> Result<(), PortError> {
            self.payouts.write().await.insert(payout.id, payout);
            Ok(())
        }

        async fn get(&self, id: PayoutId) -> Result<Payout, PortError> {
            self.payouts
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Payout", id))
        }

        async fn update(
            &self,
            payout: &Payout,
            expected_version: u64,
        ) -> Result<Payout, PortError> {
            let mut payouts = self.payouts.write().await;
            let stored = payouts
                .get_mut(&payout.id)
                .ok_or_else(|| PortError::not_found("Payout", payout.id))?;

            if stored.version != expected_version {
                return Err(PortError::conflict(format!(
                    "payout {}: expected version {}, found {}",
                    payout.id, expected_version, stored.version
                )));
            }

            let mut updated = payout.clone();
            updated.version = expected_version + 1;
            *stored = updated.clone();
            Ok(updated)
        }

        async fn list_due_scheduled(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<Payout>, PortError> {
            let mut due: Vec<Payout> = self
                .payouts
                .read()
                .await
                .values()
                .filter(|p| {
                    p.status == PayoutStatus::Pending
                        && p.scheduled_for.is_some_and(|at| at <= now)
                })
                .cloned()
                .collect();
            due.sort_by_key(|p| p.created_at);
            Ok(due)
        }

        async fn completed_amounts(&self) -> Result<Vec<Decimal>, PortError> {
            Ok(self
                .payouts
                .read()
                .await
                .values()
                .filter(|p| p.status == PayoutStatus::Completed)
                .map(|p| p.amount.amount())
                .collect())
        }

        async fn insert_batch(&self, batch: PayoutBatch) -> Result<(), PortError> {
            self.batches.write().await.insert(batch.id, batch);
            Ok(())
        }

        async fn update_batch(&self, batch: PayoutBatch) -> Result<(), PortError> {
            let mut batches = self.batches.write().await;
            if !batches.contains_key(&batch.id) {
                return Err(PortError::not_found("PayoutBatch", batch.id));
            }
            batches.insert(batch.id, batch);
            Ok(())
        }

        async fn get_batch(&self, id: PayoutBatchId) -> Result<PayoutBatch, PortError> {
            self.batches
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("PayoutBatch", id))
        }

        async fn list_by_batch(
            &self,
            batch_id: PayoutBatchId,
        ) -> Result<Vec<Payout>, PortError> {
            let mut rows: Vec<Payout> = self
                .payouts
                .read()
                .await
                .values()
                .filter(|p| p.batch_id == Some(batch_id))
                .cloned()
                .collect();
            rows.sort_by_key(|p| p.created_at);
            Ok(rows)
        }
    }
}

//! Settlement rail port
//!
//! The rail is the only external system this engine suspends on. Every
//! transfer carries a caller-derived idempotency key; a conforming rail
//! returns the original receipt for a repeated key instead of moving
//! funds again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{DomainPort, Money, PortError};

/// Terminal state of a rail transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RailStatus {
    /// Funds moved
    Confirmed,
    /// Definitively rejected; retrying with the same key will not help
    Rejected,
    /// Submitted, outcome not yet known
    InFlight,
}

/// Receipt returned by a rail transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailReceipt {
    /// Rail-side transaction reference
    pub tx_ref: String,
    /// Transaction state at return time
    pub status: RailStatus,
}

/// An external payment network moving funds out
#[async_trait]
pub trait SettlementRail: DomainPort {
    /// Current spendable balance
    async fn get_balance(&self) -> Result<Money, PortError>;

    /// Submits a transfer
    ///
    /// Implementations must deduplicate on `idempotency_key`: a repeated
    /// call with the same key returns the original receipt without
    /// moving funds again.
    async fn transfer(
        &self,
        destination: &str,
        amount: Money,
        idempotency_key: Uuid,
    ) -> Result<RailReceipt, PortError>;

    /// Looks up the state of a previously submitted transaction
    async fn get_transaction_status(&self, tx_ref: &str) -> Result<RailStatus, PortError>;
}

/// In-memory rail for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Deterministic in-memory rail
    ///
    /// Dedupes transfers by idempotency key and can be told to fail the
    /// next N transfer calls with a transient error, for retry tests.
    #[derive(Debug)]
    pub struct MockRail {
        balance: Arc<RwLock<Money>>,
        transfers: Arc<RwLock<HashMap<Uuid, RailReceipt>>>,
        transient_failures: AtomicU32,
    }

    impl MockRail {
        pub fn with_balance(balance: Money) -> Self {
            Self {
                balance: Arc::new(RwLock::new(balance)),
                transfers: Arc::new(RwLock::new(HashMap::new())),
                transient_failures: AtomicU32::new(0),
            }
        }

        /// The next `count` transfer calls fail with a timeout
        pub fn fail_next_transfers(&self, count: u32) {
            self.transient_failures.store(count, Ordering::SeqCst);
        }

        /// Number of distinct transfers executed
        pub async fn transfer_count(&self) -> usize {
            self.transfers.read().await.len()
        }

        fn should_fail(&self) -> bool {
            self.transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl DomainPort for MockRail {}

    #[async_trait]
    impl SettlementRail for MockRail {
        async fn get_balance(&self) -> Result<Money, PortError> {
            Ok(*self.balance.read().await)
        }

        async fn transfer(
            &self,
            _destination: &str,
            amount: Money,
            idempotency_key: Uuid,
        ) -> Result<RailReceipt, PortError> {
            if let Some(existing) = self.transfers.read().await.get(&idempotency_key) {
                return Ok(existing.clone());
            }
            if self.should_fail() {
                return Err(PortError::Timeout {
                    operation: "transfer".to_string(),
                    duration_ms: 5_000,
                });
            }

            let mut balance = self.balance.write().await;
            let remaining = balance.checked_sub(&amount).map_err(|e| {
                PortError::validation(format!("transfer exceeds balance: {e}"))
            })?;
            if remaining.is_negative() {
                return Err(PortError::validation("transfer exceeds balance"));
            }
            *balance = remaining;

            let receipt = RailReceipt {
                tx_ref: format!("mock-{}", idempotency_key.simple()),
                status: RailStatus::Confirmed,
            };
            self.transfers
                .write()
                .await
                .insert(idempotency_key, receipt.clone());
            Ok(receipt)
        }

        async fn get_transaction_status(&self, tx_ref: &str) -> Result<RailStatus, PortError> {
            let known = self
                .transfers
                .read()
                .await
                .values()
                .any(|r| r.tx_ref == tx_ref);
            if known {
                Ok(RailStatus::Confirmed)
            } else {
                Err(PortError::not_found("RailTransaction", tx_ref))
            }
        }
    }
}

//! Dunning Domain Ports

use async_trait::async_trait;

use core_kernel::{DomainPort, InvoiceId, PortError};

use crate::attempt::DunningAttempt;

/// Append-only storage for dunning attempts
#[async_trait]
pub trait DunningStore: DomainPort {
    /// Appends an attempt; rejects a duplicate attempt number for the
    /// same invoice with `PortError::Conflict`
    async fn append(&self, attempt: DunningAttempt) -> Result<(), PortError>;

    /// Highest attempt number recorded for an invoice, 0 if none
    async fn last_attempt_number(&self, invoice_id: InvoiceId) -> Result<u32, PortError>;

    /// All attempts for one invoice, in attempt order
    async fn list_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<DunningAttempt>, PortError>;
}

/// In-memory adapter for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory dunning store enforcing strictly increasing attempts
    #[derive(Debug, Default)]
    pub struct MemoryDunningStore {
        attempts: Arc<RwLock<Vec<DunningAttempt>>>,
    }

    impl MemoryDunningStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MemoryDunningStore {}

    #[async_trait]
    impl DunningStore for MemoryDunningStore {
        async fn append(&self, attempt: DunningAttempt) -> Result<(), PortError> {
            let mut attempts = self.attempts.write().await;
            let duplicate = attempts.iter().any(|a| {
                a.invoice_id == attempt.invoice_id
                    && a.attempt_number == attempt.attempt_number
            });
            if duplicate {
                return Err(PortError::conflict(format!(
                    "attempt {} for invoice {} already recorded",
                    attempt.attempt_number, attempt.invoice_id
                )));
            }
            attempts.push(attempt);
            Ok(())
        }

        async fn last_attempt_number(&self, invoice_id: InvoiceId) -> Result<u32, PortError> {
            Ok(self
                .attempts
                .read()
                .await
                .iter()
                .filter(|a| a.invoice_id == invoice_id)
                .map(|a| a.attempt_number)
                .max()
                .unwrap_or(0))
        }

        async fn list_by_invoice(
            &self,
            invoice_id: InvoiceId,
        ) -> Result<Vec<DunningAttempt>, PortError> {
            let mut out: Vec<DunningAttempt> = self
                .attempts
                .read()
                .await
                .iter()
                .filter(|a| a.invoice_id == invoice_id)
                .cloned()
                .collect();
            out.sort_by_key(|a| a.attempt_number);
            Ok(out)
        }
    }
}

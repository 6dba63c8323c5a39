//! Invoicing Domain Ports

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{DomainPort, InvoiceId, PortError, SubscriptionId};

use crate::credit_note::CreditNote;
use crate::invoice::{Invoice, InvoiceStatus};

/// Durable storage for invoices
///
/// Updates are compare-and-swap on the invoice version, matching the
/// subscription store contract.
#[async_trait]
pub trait InvoiceStore: DomainPort {
    /// Persists a new invoice
    async fn insert(&self, invoice: Invoice) -> Result<(), PortError>;

    /// Retrieves an invoice by ID
    async fn get(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// Compare-and-swap update; returns the stored row with bumped version
    async fn update(
        &self,
        invoice: &Invoice,
        expected_version: u64,
    ) -> Result<Invoice, PortError>;

    /// The invoice covering one subscription period, if any
    async fn find_by_period(
        &self,
        subscription_id: SubscriptionId,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Invoice>, PortError>;

    /// All invoices for one subscription
    async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Invoice>, PortError>;

    /// Every invoice currently in the given status
    async fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, PortError>;
}

/// Append-only storage for credit notes
#[async_trait]
pub trait CreditNoteStore: DomainPort {
    /// Appends a credit note
    async fn insert(&self, note: CreditNote) -> Result<(), PortError>;

    /// All credit notes for one subscription
    async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<CreditNote>, PortError>;
}

/// In-memory adapters for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory invoice store with CAS versioning
    #[derive(Debug, Default)]
    pub struct MemoryInvoiceStore {
        invoices: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
    }

    impl MemoryInvoiceStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MemoryInvoiceStore {}

    #[async_trait]
    impl InvoiceStore for MemoryInvoiceStore {
        async fn insert(&self, invoice: Invoice) -> Result<(), PortError> {
            let mut invoices = self.invoices.write().await;
            let duplicate = invoices.values().any(|i| {
                i.subscription_id == invoice.subscription_id
                    && i.period.start() == invoice.period.start()
            });
            if duplicate {
                return Err(PortError::conflict(format!(
                    "invoice for subscription {} period {} already exists",
                    invoice.subscription_id,
                    invoice.period.start()
                )));
            }
            invoices.insert(invoice.id, invoice);
            Ok(())
        }

        async fn get(&self, id: InvoiceId) -> Result<Invoice, PortError> {
            self.invoices
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Invoice", id))
        }

        async fn update(
            &self,
            invoice: &Invoice,
            expected_version: u64,
        ) -> Result<Invoice, PortError> {
            let mut invoices = self.invoices.write().await;
            let stored = invoices
                .get_mut(&invoice.id)
                .ok_or_else(|| PortError::not_found("Invoice", invoice.id))?;

            if stored.version != expected_version {
                return Err(PortError::conflict(format!(
                    "invoice {}: expected version {}, found {}",
                    invoice.id, expected_version, stored.version
                )));
            }

            let mut updated = invoice.clone();
            updated.version = expected_version + 1;
            *stored = updated.clone();
            Ok(updated)
        }

        async fn find_by_period(
            &self,
            subscription_id: SubscriptionId,
            period_start: DateTime<Utc>,
        ) -> Result<Option<Invoice>, PortError> {
            Ok(self
                .invoices
                .read()
                .await
                .values()
                .find(|i| i.subscription_id == subscription_id && i.period.start() == period_start)
                .cloned())
        }

        async fn list_by_subscription(
            &self,
            subscription_id: SubscriptionId,
        ) -> Result<Vec<Invoice>, PortError> {
            let mut out: Vec<Invoice> = self
                .invoices
                .read()
                .await
                .values()
                .filter(|i| i.subscription_id == subscription_id)
                .cloned()
                .collect();
            out.sort_by_key(|i| i.issue_date);
            Ok(out)
        }

        async fn list_by_status(
            &self,
            status: InvoiceStatus,
        ) -> Result<Vec<Invoice>, PortError> {
            let mut out: Vec<Invoice> = self
                .invoices
                .read()
                .await
                .values()
                .filter(|i| i.status == status)
                .cloned()
                .collect();
            out.sort_by_key(|i| i.issue_date);
            Ok(out)
        }
    }

    /// In-memory credit note store
    #[derive(Debug, Default)]
    pub struct MemoryCreditNoteStore {
        notes: Arc<RwLock<Vec<CreditNote>>>,
    }

    impl MemoryCreditNoteStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MemoryCreditNoteStore {}

    #[async_trait]
    impl CreditNoteStore for MemoryCreditNoteStore {
        async fn insert(&self, note: CreditNote) -> Result<(), PortError> {
            self.notes.write().await.push(note);
            Ok(())
        }

        async fn list_by_subscription(
            &self,
            subscription_id: SubscriptionId,
        ) -> Result<Vec<CreditNote>, PortError> {
            Ok(self
                .notes
                .read()
                .await
                .iter()
                .filter(|n| n.subscription_id == subscription_id)
                .cloned()
                .collect())
        }
    }
}

//! Invoicing domain errors

use thiserror::Error;

use core_kernel::{InvoiceId, MoneyError, PortError, SubscriptionId};

/// Errors that can occur in the invoicing domain
#[derive(Debug, Error)]
pub enum InvoicingError {
    /// Malformed or out-of-range input, rejected before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reference to an unknown invoice or subscription
    #[error("Not found: {0}")]
    NotFound(String),

    /// A second invoice for the same subscription and period
    #[error("Invoice already exists for subscription {subscription_id} in period starting {period_start}")]
    DuplicateInvoice {
        subscription_id: SubscriptionId,
        period_start: chrono::DateTime<chrono::Utc>,
    },

    /// Operation not valid for the invoice's current status
    #[error("Invalid invoice status: expected {expected}, found {found}")]
    InvalidStatus {
        expected: &'static str,
        found: &'static str,
    },

    /// Tax has already been applied to this invoice
    #[error("Tax already applied to invoice {0}")]
    TaxAlreadyApplied(InvoiceId),

    /// Monetary arithmetic failure
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Store failure
    #[error(transparent)]
    Port(#[from] PortError),
}

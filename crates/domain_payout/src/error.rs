//! Payout domain errors

use thiserror::Error;

use core_kernel::{Money, MoneyError, PayoutId, PortError};

/// Errors that can occur in the payout domain
#[derive(Debug, Error)]
pub enum PayoutError {
    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reference to an unknown payout or batch
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rail balance cannot cover the requested amount
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Money, available: Money },

    /// Recipient has not passed verification
    #[error("Recipient not verified: {0}")]
    UnverifiedRecipient(String),

    /// Payout lacks the required manual approval
    #[error("Payout not approved: {0}")]
    NotApproved(String),

    /// The fraud screen flagged the payout; a flagged record was
    /// persisted for manual review and no transfer was executed
    #[error("Payout {payout_id} flagged by fraud screen")]
    FraudFlagged { payout_id: PayoutId },

    /// Rail transfer failed after exhausting retries
    #[error("Rail transfer failed: {0}")]
    RailTransfer(String),

    /// Monetary arithmetic failure
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Store failure
    #[error(transparent)]
    Port(#[from] PortError),
}

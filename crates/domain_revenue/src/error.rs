//! Revenue domain errors

use thiserror::Error;

use core_kernel::{DeferredEntryId, Money, MoneyError, PortError};

/// Errors that can occur in the revenue domain
#[derive(Debug, Error)]
pub enum RevenueError {
    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A deferred entry closed without releasing its full amount. This
    /// is an internal accounting bug, not a recoverable runtime
    /// condition.
    #[error("Amortization invariant violated for entry {entry_id}: released {released}, expected {expected}")]
    AmortizationInvariant {
        entry_id: DeferredEntryId,
        expected: Money,
        released: Money,
    },

    /// Monetary arithmetic failure
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Store failure
    #[error(transparent)]
    Port(#[from] PortError),
}

//! Dunning domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur in the dunning domain
#[derive(Debug, Error)]
pub enum DunningError {
    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reference to an unknown invoice or subscription
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invoice or subscription state change failed mid-cycle
    #[error("Invoicing error: {0}")]
    Invoicing(#[from] domain_invoicing::InvoicingError),

    /// Store failure
    #[error(transparent)]
    Port(#[from] PortError),
}

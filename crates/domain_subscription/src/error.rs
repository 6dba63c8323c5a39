//! Subscription domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur in the subscription domain
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Malformed or out-of-range input, rejected before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reference to an unknown customer or subscription
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transition not allowed by the lifecycle state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Store or external port failure
    #[error(transparent)]
    Port(#[from] PortError),
}

//! Events domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur in the events domain
#[derive(Debug, Error)]
pub enum EventsError {
    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store or notification failure
    #[error(transparent)]
    Port(#[from] PortError),
}

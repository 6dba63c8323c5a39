//! Engine error type

use thiserror::Error;

use core_kernel::PortError;
use domain_dunning::DunningError;
use domain_events::EventsError;
use domain_invoicing::InvoicingError;
use domain_payout::PayoutError;
use domain_revenue::RevenueError;
use domain_subscription::SubscriptionError;

/// Errors surfaced by the billing engine
///
/// One variant per domain so callers can match on the origin without
/// losing the typed inner error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Invoicing(#[from] InvoicingError),

    #[error(transparent)]
    Revenue(#[from] RevenueError),

    #[error(transparent)]
    Dunning(#[from] DunningError),

    #[error(transparent)]
    Payout(#[from] PayoutError),

    #[error(transparent)]
    Events(#[from] EventsError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("Configuration error: {0}")]
    Config(String),
}

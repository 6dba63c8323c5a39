//! Payout Domain - Moving Funds Out Over a Settlement Rail
//!
//! Payouts pass three gates before any transfer: recipient verification,
//! manual approval, and a rail balance check. A robust outlier screen
//! then compares the amount against the historical distribution; an
//! anomalous payout is persisted as flagged and held for a human, never
//! executed or silently retried. Transfers carry a deterministic
//! idempotency key, so a retry after a timeout cannot move funds twice.

pub mod payout;
pub mod rail;
pub mod fraud;
pub mod processor;
pub mod ports;
pub mod error;

pub use payout::{BatchStatus, Payout, PayoutBatch, PayoutStatus};
pub use rail::{RailReceipt, RailStatus, SettlementRail};
#[cfg(any(test, feature = "mock"))]
pub use rail::mock::MockRail;
pub use fraud::FraudScreen;
pub use processor::{BatchPayoutRequest, PayoutProcessor, PayoutRow, SinglePayoutRequest};
pub use ports::PayoutStore;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MemoryPayoutStore;
pub use error::PayoutError;

//! Revenue Domain - Recognition and Amortization
//!
//! Revenue splits at invoice issuance: the already-elapsed share of the
//! billing period is recognized immediately, the remainder is deferred
//! over a window ending at the period end. A monthly amortization pass
//! releases each deferred entry in day-weighted slices; the slice that
//! closes a window carries the exact remaining balance, so the released
//! total always equals the deferred amount to the cent.

pub mod entries;
pub mod recognition;
pub mod reporting;
pub mod ports;
pub mod error;

pub use entries::{DeferredRevenueEntry, DeferredStatus, RecognizedRevenueEntry};
pub use recognition::{IssuanceSplit, RevenueRecognitionEngine};
pub use reporting::{churn_rate, mrr};
pub use ports::RevenueStore;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MemoryRevenueStore;
pub use error::RevenueError;

//! Dunning Domain - Collecting on Overdue Invoices
//!
//! Once an invoice passes its due date it enters a fixed retry schedule.
//! Each step appends an attempt record, notifies the customer, and moves
//! the subscription to past-due; exhausting the schedule voids the
//! invoice and cancels the subscription. Attempt numbers are strictly
//! increasing per invoice, which makes the periodic cycle safe to re-run.

pub mod attempt;
pub mod schedule;
pub mod scheduler;
pub mod ports;
pub mod error;

pub use attempt::{AttemptOutcome, DunningAttempt};
pub use schedule::DunningSchedule;
pub use scheduler::{CycleReport, DunningScheduler, DunningStep};
pub use ports::DunningStore;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MemoryDunningStore;
pub use error::DunningError;

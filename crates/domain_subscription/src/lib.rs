//! Subscription Domain - Lifecycle and Customer Association
//!
//! This crate owns the subscription lifecycle: onboarding customers,
//! creating subscriptions (with trial, coupon, tax-rate and entitlement
//! attributes), upgrades, and cancellation. Status transitions follow a
//! strict state machine:
//!
//! ```text
//! Trialing ──trial elapsed──▶ Active ◀──recovery── PastDue
//!     │                         │  ──dunning──▶      │
//!     └────────────────────▶ Canceled ◀──────────────┘
//! ```
//!
//! `Canceled` is terminal. Subscriptions are never physically deleted.

pub mod customer;
pub mod subscription;
pub mod ledger;
pub mod ports;
pub mod error;

pub use customer::{Customer, CustomerPatch};
pub use subscription::{Subscription, SubscriptionStatus, CreateSubscriptionRequest};
pub use ledger::SubscriptionLedger;
pub use ports::{CustomerStore, SubscriptionStore, TaxPort};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{FixedTaxPort, MemoryCustomerStore, MemorySubscriptionStore};
pub use error::SubscriptionError;

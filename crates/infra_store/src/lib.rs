//! PostgreSQL Persistence Layer
//!
//! Implements every domain store port against PostgreSQL through SQLx.
//! Queries are bound at runtime so the crate builds without a live
//! database; the schema lives in `migrations/` and is applied with
//! `run_migrations`.
//!
//! Mutable entities carry a `version` column; updates are
//! compare-and-swap (`WHERE id = $1 AND version = $2`) and a lost race
//! surfaces as `PortError::Conflict`, which the periodic passes treat
//! as "someone else got there first".

pub mod pool;
pub mod error;
pub mod repositories;

pub use pool::{create_pool, run_migrations, StoreConfig, StorePool};
pub use error::StoreError;
pub use repositories::{
    PgCustomerStore, PgSubscriptionStore, PgInvoiceStore, PgCreditNoteStore, PgRevenueStore,
    PgDunningStore, PgPayoutStore, PgAuditStore, PgOutboxStore,
};

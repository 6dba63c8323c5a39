//! Store port implementations backed by PostgreSQL
//!
//! Each module implements the port traits of one domain crate. Rows map
//! to domain types by hand; statuses travel as their stable string
//! forms and money as (NUMERIC, currency code) pairs. A value that
//! fails to map back is reported as an internal port error rather than
//! silently coerced.

pub mod subscription;
pub mod invoice;
pub mod revenue;
pub mod dunning;
pub mod payout;
pub mod events;

pub use subscription::{PgCustomerStore, PgSubscriptionStore};
pub use invoice::{PgCreditNoteStore, PgInvoiceStore};
pub use revenue::PgRevenueStore;
pub use dunning::PgDunningStore;
pub use payout::PgPayoutStore;
pub use events::{PgAuditStore, PgOutboxStore};

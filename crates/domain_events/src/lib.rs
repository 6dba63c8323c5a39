//! Events Domain - Audit Trail and Outbound Delivery
//!
//! Two append-only concerns live here: the audit log, which records who
//! did what, and the webhook outbox, which turns in-process events into
//! at-least-once deliveries to external listeners. Operations enqueue
//! outbox entries as part of their own write; a background dispatcher
//! drains the outbox with retry and backoff, dead-lettering entries that
//! keep failing instead of dropping them.

pub mod audit;
pub mod outbox;
pub mod dispatcher;
pub mod ports;
pub mod error;

pub use audit::{AuditLog, AuditRecord};
pub use outbox::{Outbox, OutboxEntry, OutboxStatus};
pub use dispatcher::{DispatchReport, OutboxDispatcher, WebhookRegistration};
pub use ports::{AuditStore, NotificationPort, OutboxStore};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{MemoryAuditStore, MemoryNotifier, MemoryOutboxStore};
pub use error::EventsError;

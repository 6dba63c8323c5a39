//! Invoicing Domain - Invoice Generation and Payment Confirmation
//!
//! One invoice per subscription per billing period, enforced by a
//! period-keyed uniqueness check so the periodic generation pass can be
//! re-run safely. Tax is applied to an open invoice exactly once, after
//! the coupon discount. Payment confirmation closes the invoice and
//! recovers a past-due subscription.

pub mod invoice;
pub mod credit_note;
pub mod generator;
pub mod ports;
pub mod error;

pub use invoice::{Invoice, InvoiceStatus};
pub use credit_note::CreditNote;
pub use generator::{InvoiceGenerator, PaymentConfirmation};
pub use ports::{CreditNoteStore, InvoiceStore};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{MemoryCreditNoteStore, MemoryInvoiceStore};
pub use error::InvoicingError;

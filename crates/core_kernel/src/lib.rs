//! Core Kernel - Foundational types and utilities for the billing engine
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic
//! - Billing-period and reporting-month temporal types
//! - Common identifiers and the port/adapter infrastructure

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{BillingPeriod, ReportingMonth, TemporalError};
pub use identifiers::{
    OrgId, CustomerId, SubscriptionId, InvoiceId, CreditNoteId,
    DunningAttemptId, RevenueEntryId, DeferredEntryId,
    PayoutId, PayoutBatchId, OutboxEntryId, AuditEventId,
};
pub use ports::{PortError, DomainPort};

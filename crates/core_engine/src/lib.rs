//! Billing Engine
//!
//! Wires the domain services into one invocation surface, owns runtime
//! configuration, and drives the periodic billing passes. Every
//! operation takes a [`RequestContext`] carrying the acting principal,
//! which flows into the audit trail.

pub mod config;
pub mod context;
pub mod error;
pub mod adapters;
pub mod engine;
pub mod scheduler;
pub mod telemetry;

pub use config::EngineConfig;
pub use context::RequestContext;
pub use error::EngineError;
pub use adapters::{LoggingNotifier, StaticTaxPort};
pub use engine::{BillingEngine, EnginePorts};
pub use scheduler::JobScheduler;
pub use telemetry::init_tracing;

//! Webhook outbox
//!
//! Events are enqueued durably during the originating operation and
//! delivered later by the dispatcher. An entry tracks its own retry
//! state; once `attempts` reaches the dispatcher's limit it moves to
//! `Dead` and stays visible for the operator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use core_kernel::OutboxEntryId;

use crate::error::EventsError;
use crate::ports::OutboxStore;

/// Delivery state of an outbox entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    /// Waiting for delivery or retry
    Pending,
    /// Delivered to every registered listener
    Delivered,
    /// Retry budget exhausted; kept for inspection
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Delivered => "delivered",
            OutboxStatus::Dead => "dead",
        }
    }
}

/// One event awaiting webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Unique identifier
    pub id: OutboxEntryId,
    /// Event type, such as `sub_cancel` or `invoice_paid`
    pub event: String,
    /// JSON payload delivered verbatim
    pub payload: Value,
    /// Delivery attempts so far
    pub attempts: u32,
    /// Earliest time the next attempt may run
    pub next_attempt_at: DateTime<Utc>,
    /// Delivery state
    pub status: OutboxStatus,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(event: impl Into<String>, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: OutboxEntryId::new_v7(),
            event: event.into(),
            payload,
            attempts: 0,
            next_attempt_at: now,
            status: OutboxStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the entry is due for a delivery attempt
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && now >= self.next_attempt_at
    }
}

/// Write side of the outbox, used by originating operations
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
}

impl Outbox {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Enqueues one event for at-least-once delivery, due immediately
    pub async fn enqueue(
        &self,
        event: &str,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<OutboxEntry, EventsError> {
        if event.trim().is_empty() {
            return Err(EventsError::Validation(
                "event type must not be empty".to_string(),
            ));
        }
        let entry = OutboxEntry::new(event, payload, now);
        self.store.insert(entry.clone()).await?;
        debug!(event, entry_id = %entry.id, "outbox entry enqueued");
        Ok(entry)
    }
}

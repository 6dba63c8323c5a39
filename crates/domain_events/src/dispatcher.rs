//! Outbox dispatcher
//!
//! Drains due outbox entries and delivers each to every registration for
//! its event type. A failed delivery reschedules the entry with an
//! exponential backoff; once the attempt budget is spent the entry is
//! dead-lettered rather than dropped.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::EventsError;
use crate::outbox::{OutboxEntry, OutboxStatus};
use crate::ports::{NotificationPort, OutboxStore};

/// Static webhook registration: one event type, one target URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub event: String,
    pub url: String,
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub rescheduled: usize,
    pub dead_lettered: usize,
}

/// Background delivery loop over the outbox
pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    notifier: Arc<dyn NotificationPort>,
    registrations: Vec<WebhookRegistration>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        notifier: Arc<dyn NotificationPort>,
        registrations: Vec<WebhookRegistration>,
        max_attempts: u32,
        base_backoff: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            registrations,
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Delivers every due entry once
    ///
    /// An entry counts as delivered only when every registered target
    /// accepted it; otherwise the whole entry is retried later, which
    /// can re-deliver to targets that already succeeded. Listeners are
    /// expected to deduplicate on the entry ID carried in the payload
    /// envelope.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<DispatchReport, EventsError> {
        let mut report = DispatchReport::default();

        for mut entry in self.store.list_due(now).await? {
            let delivered = self.deliver(&entry).await;
            entry.attempts += 1;
            entry.updated_at = now;

            if delivered {
                entry.status = OutboxStatus::Delivered;
                report.delivered += 1;
            } else if entry.attempts >= self.max_attempts {
                entry.status = OutboxStatus::Dead;
                report.dead_lettered += 1;
                warn!(
                    entry_id = %entry.id,
                    event = %entry.event,
                    attempts = entry.attempts,
                    "outbox entry dead-lettered"
                );
            } else {
                // Exponential backoff: base * 2^(attempts-1)
                let factor = 1_i64 << (entry.attempts - 1).min(16);
                entry.next_attempt_at = now + self.base_backoff * (factor as i32);
                report.rescheduled += 1;
            }

            self.store.update(entry).await?;
        }

        info!(
            delivered = report.delivered,
            rescheduled = report.rescheduled,
            dead_lettered = report.dead_lettered,
            "outbox pass complete"
        );
        Ok(report)
    }

    async fn deliver(&self, entry: &OutboxEntry) -> bool {
        let envelope = serde_json::json!({
            "id": entry.id.to_string(),
            "event": entry.event,
            "payload": entry.payload,
        });

        let mut all_ok = true;
        for registration in self
            .registrations
            .iter()
            .filter(|r| r.event == entry.event)
        {
            if let Err(e) = self.notifier.send_webhook(&registration.url, &envelope).await {
                warn!(
                    entry_id = %entry.id,
                    url = %registration.url,
                    error = %e,
                    "webhook delivery failed"
                );
                all_ok = false;
            }
        }
        all_ok
    }
}

//! Dunning scheduler
//!
//! The periodic cycle does three things in order: roll open invoices
//! past their due date into `Overdue`, take the next scheduled
//! collection step on each overdue invoice, and void invoices whose
//! schedule is spent, cancelling their subscriptions. Every step is
//! keyed by the invoice's monotonic attempt counter, so overlapping or
//! repeated cycle runs never double-collect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};

use core_kernel::InvoiceId;
use domain_events::{AuditLog, NotificationPort, Outbox};
use domain_invoicing::{Invoice, InvoiceStatus, InvoiceStore};
use domain_subscription::{CustomerStore, SubscriptionStatus, SubscriptionStore};

use crate::attempt::{AttemptOutcome, DunningAttempt};
use crate::error::DunningError;
use crate::ports::DunningStore;
use crate::schedule::DunningSchedule;

/// One collection step taken during a cycle
#[derive(Debug, Clone)]
pub struct DunningStep {
    pub invoice_id: InvoiceId,
    pub attempt_number: u32,
}

/// Outcome of one dunning cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Invoices rolled from open to overdue
    pub marked_overdue: usize,
    /// Collection attempts taken
    pub attempts: Vec<DunningStep>,
    /// Invoices voided after schedule exhaustion
    pub voided: Vec<InvoiceId>,
}

/// Service collecting on overdue invoices
pub struct DunningScheduler {
    attempts: Arc<dyn DunningStore>,
    invoices: Arc<dyn InvoiceStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    customers: Arc<dyn CustomerStore>,
    notifier: Arc<dyn NotificationPort>,
    audit: Arc<AuditLog>,
    outbox: Arc<Outbox>,
    schedule: DunningSchedule,
}

impl DunningScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attempts: Arc<dyn DunningStore>,
        invoices: Arc<dyn InvoiceStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        customers: Arc<dyn CustomerStore>,
        notifier: Arc<dyn NotificationPort>,
        audit: Arc<AuditLog>,
        outbox: Arc<Outbox>,
        schedule: DunningSchedule,
    ) -> Self {
        Self {
            attempts,
            invoices,
            subscriptions,
            customers,
            notifier,
            audit,
            outbox,
            schedule,
        }
    }

    /// Runs one full dunning cycle at `now`
    ///
    /// Conflicted entities (a concurrent writer won the version race)
    /// are skipped and picked up by the next cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(
        &self,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, DunningError> {
        let mut report = CycleReport::default();

        for mut invoice in self.invoices.list_by_status(InvoiceStatus::Open).await? {
            if !invoice.is_past_due(now) {
                continue;
            }
            let expected_version = invoice.version;
            invoice.mark_overdue()?;
            match self.invoices.update(&invoice, expected_version).await {
                Ok(_) => report.marked_overdue += 1,
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        for invoice in self.invoices.list_by_status(InvoiceStatus::Overdue).await? {
            let subscription = self.subscriptions.get(invoice.subscription_id).await?;
            if !subscription.auto_dunning
                || subscription.status == SubscriptionStatus::Canceled
            {
                continue;
            }

            let previous = self.attempts.last_attempt_number(invoice.id).await?;

            if self.schedule.is_exhausted(previous) {
                let invoice_id = invoice.id;
                self.exhaust(actor_id, invoice, now).await?;
                report.voided.push(invoice_id);
                continue;
            }

            let next = previous + 1;
            let due_at = match self.schedule.attempt_due_at(invoice.due_date, next) {
                Some(at) => at,
                None => continue,
            };
            if now < due_at {
                continue;
            }

            match self.take_step(actor_id, &invoice, next, now).await {
                Ok(step) => report.attempts.push(step),
                Err(DunningError::Port(e)) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }

        info!(
            marked_overdue = report.marked_overdue,
            attempts = report.attempts.len(),
            voided = report.voided.len(),
            "dunning cycle complete"
        );
        Ok(report)
    }

    /// Takes one manual collection step
    ///
    /// # Errors
    ///
    /// Returns `DunningError::Validation` unless the invoice is overdue
    /// and `attempt_number` is exactly one past the latest attempt.
    #[instrument(skip(self))]
    pub async fn dun(
        &self,
        actor_id: &str,
        invoice_id: InvoiceId,
        attempt_number: u32,
        now: DateTime<Utc>,
    ) -> Result<DunningStep, DunningError> {
        let invoice = self.invoices.get(invoice_id).await?;
        if invoice.status != InvoiceStatus::Overdue {
            return Err(DunningError::Validation(format!(
                "invoice {} is {}, not overdue",
                invoice.id, invoice.status
            )));
        }

        let previous = self.attempts.last_attempt_number(invoice.id).await?;
        if attempt_number != previous + 1 {
            return Err(DunningError::Validation(format!(
                "attempt number must be {}, got {}",
                previous + 1,
                attempt_number
            )));
        }
        if attempt_number > self.schedule.max_attempts() {
            return Err(DunningError::Validation(format!(
                "attempt number {} exceeds schedule of {}",
                attempt_number,
                self.schedule.max_attempts()
            )));
        }

        self.take_step(actor_id, &invoice, attempt_number, now).await
    }

    async fn take_step(
        &self,
        actor_id: &str,
        invoice: &Invoice,
        attempt_number: u32,
        now: DateTime<Utc>,
    ) -> Result<DunningStep, DunningError> {
        // The append is the serialization point: a concurrent cycle that
        // raced us to the same attempt number loses here, before any
        // notification goes out.
        self.attempts
            .append(DunningAttempt::new(
                invoice.id,
                attempt_number,
                AttemptOutcome::Pending,
                now,
            ))
            .await?;

        let customer = self.customers.get(invoice.customer_id).await?;
        if let Err(e) = self
            .notifier
            .send_email(
                &customer.email,
                &format!("Payment reminder for invoice {}", invoice.invoice_number),
                &format!(
                    "Invoice {} for {} is overdue. This is reminder {} of {}.",
                    invoice.invoice_number,
                    invoice.total_due(),
                    attempt_number,
                    self.schedule.max_attempts()
                ),
            )
            .await
        {
            // Email is best-effort; the attempt stands either way
            warn!(invoice_id = %invoice.id, error = %e, "dunning email failed");
        }

        let mut subscription = self.subscriptions.get(invoice.subscription_id).await?;
        if subscription.status == SubscriptionStatus::Active {
            let expected_version = subscription.version;
            subscription
                .transition_to(SubscriptionStatus::PastDue)
                .map_err(|e| DunningError::Validation(e.to_string()))?;
            self.subscriptions
                .update(&subscription, expected_version)
                .await?;
        }

        self.audit
            .record(
                actor_id,
                "initiated_dunning",
                &format!("invoice {} attempt {}", invoice.id, attempt_number),
            )
            .await
            .map_err(events_to_dunning)?;

        info!(
            invoice_id = %invoice.id,
            attempt_number,
            "dunning attempt recorded"
        );
        Ok(DunningStep {
            invoice_id: invoice.id,
            attempt_number,
        })
    }

    async fn exhaust(
        &self,
        actor_id: &str,
        mut invoice: Invoice,
        now: DateTime<Utc>,
    ) -> Result<(), DunningError> {
        let expected_version = invoice.version;
        invoice.void()?;
        self.invoices.update(&invoice, expected_version).await?;

        let mut subscription = self.subscriptions.get(invoice.subscription_id).await?;
        if subscription.cancel() {
            let expected_version = subscription.version;
            self.subscriptions
                .update(&subscription, expected_version)
                .await?;
        }

        self.outbox
            .enqueue(
                "sub_cancel",
                json!({
                    "subscription_id": subscription.id.to_string(),
                    "invoice_id": invoice.id.to_string(),
                    "reason": "dunning_exhausted",
                }),
                now,
            )
            .await
            .map_err(events_to_dunning)?;

        self.audit
            .record(
                actor_id,
                "dunning_exhausted",
                &format!(
                    "invoice {} voided, subscription {} canceled",
                    invoice.id, subscription.id
                ),
            )
            .await
            .map_err(events_to_dunning)?;

        info!(
            invoice_id = %invoice.id,
            subscription_id = %subscription.id,
            "dunning exhausted"
        );
        Ok(())
    }
}

fn events_to_dunning(e: domain_events::EventsError) -> DunningError {
    match e {
        domain_events::EventsError::Port(p) => DunningError::Port(p),
        other => DunningError::Validation(other.to_string()),
    }
}

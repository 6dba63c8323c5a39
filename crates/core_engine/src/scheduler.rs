//! Periodic billing jobs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use core_kernel::ReportingMonth;

use crate::context::RequestContext;
use crate::engine::BillingEngine;

/// Drives the periodic passes on a fixed interval
///
/// Every pass is idempotent, so a tick that dies halfway is repaired by
/// the next one. A failing pass is logged and never stops the loop or
/// the other passes in the same tick.
pub struct JobScheduler {
    engine: Arc<BillingEngine>,
    interval: std::time::Duration,
}

impl JobScheduler {
    pub fn new(engine: Arc<BillingEngine>, interval: std::time::Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs the job loop until the task is dropped
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    /// One pass over every periodic job at `now`
    pub async fn tick(&self, now: DateTime<Utc>) {
        let ctx = RequestContext::system();

        match self.engine.generate_missing_invoices(&ctx, now).await {
            Ok(invoices) if !invoices.is_empty() => {
                info!(created = invoices.len(), "invoice pass complete")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "invoice pass failed"),
        }

        match self.engine.run_dunning_cycle(&ctx, now).await {
            Ok(report) => {
                if report.marked_overdue > 0 || !report.attempts.is_empty() {
                    info!(
                        marked_overdue = report.marked_overdue,
                        attempts = report.attempts.len(),
                        voided = report.voided.len(),
                        "dunning cycle complete"
                    );
                }
            }
            Err(e) => warn!(error = %e, "dunning cycle failed"),
        }

        let month = ReportingMonth::from_datetime(now);
        match self
            .engine
            .run_revenue_recognition_cycle(&ctx, month, now)
            .await
        {
            Ok(slices) if slices > 0 => info!(slices, %month, "amortization pass complete"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "amortization pass failed"),
        }

        match self.engine.run_scheduled_payouts(&ctx, now).await {
            Ok(executed) if !executed.is_empty() => {
                info!(executed = executed.len(), "scheduled payout pass complete")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "scheduled payout pass failed"),
        }

        match self.engine.dispatch_outbox(now).await {
            Ok(report) if report.delivered + report.rescheduled + report.dead_lettered > 0 => {
                info!(
                    delivered = report.delivered,
                    rescheduled = report.rescheduled,
                    dead_lettered = report.dead_lettered,
                    "outbox pass complete"
                )
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "outbox pass failed"),
        }
    }
}

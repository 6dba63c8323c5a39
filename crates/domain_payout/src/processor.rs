//! Payout processor
//!
//! All outbound fund movement flows through here. The order of gates is
//! fixed: input validation, recipient verification, approval, balance,
//! then the fraud screen. Nothing is persisted before the balance gate
//! passes; a flagged payout is persisted precisely so a human can find
//! and review it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use core_kernel::{Money, PayoutBatchId, PayoutId};
use domain_events::AuditLog;

use crate::error::PayoutError;
use crate::fraud::FraudScreen;
use crate::payout::{BatchStatus, Payout, PayoutBatch, PayoutStatus};
use crate::ports::PayoutStore;
use crate::rail::{RailStatus, SettlementRail};

/// Namespace for payout idempotency keys
const PAYOUT_KEY_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8f, 0x2a, 0x5c, 0x1d, 0x6b, 0x44, 0x4e, 0x9a, 0x9c, 0x3e, 0x71, 0x05, 0xd8, 0x2f, 0xaa,
    0x40,
]);

/// Request for one payout
#[derive(Debug, Clone)]
pub struct SinglePayoutRequest {
    pub destination: String,
    pub amount: Money,
    pub verified: bool,
    pub approved: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// One row of a batch payout
#[derive(Debug, Clone)]
pub struct PayoutRow {
    pub destination: String,
    pub amount: Money,
}

/// Request for a batch of payouts gated together
#[derive(Debug, Clone)]
pub struct BatchPayoutRequest {
    pub rows: Vec<PayoutRow>,
    pub verified_all: bool,
    pub approved_all: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Service executing payouts over a settlement rail
pub struct PayoutProcessor {
    store: Arc<dyn PayoutStore>,
    rail: Arc<dyn SettlementRail>,
    audit: Arc<AuditLog>,
    screen: FraudScreen,
    rail_fee: Money,
    max_transfer_retries: u32,
    retry_backoff: Duration,
}

impl PayoutProcessor {
    pub fn new(
        store: Arc<dyn PayoutStore>,
        rail: Arc<dyn SettlementRail>,
        audit: Arc<AuditLog>,
        screen: FraudScreen,
        rail_fee: Money,
        max_transfer_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            rail,
            audit,
            screen,
            rail_fee,
            max_transfer_retries,
            retry_backoff,
        }
    }

    /// Gates, screens, and executes (or schedules) one payout
    ///
    /// # Errors
    ///
    /// `UnverifiedRecipient`, `NotApproved`, and `InsufficientBalance`
    /// reject before any write. `FraudFlagged` persists the payout in
    /// `Flagged` state and returns the ID for manual review.
    #[instrument(skip(self, request), fields(destination = %request.destination))]
    pub async fn single_payout(
        &self,
        actor_id: &str,
        request: SinglePayoutRequest,
        now: DateTime<Utc>,
    ) -> Result<Payout, PayoutError> {
        self.validate_row(&request.destination, &request.amount)?;
        if !request.verified {
            return Err(PayoutError::UnverifiedRecipient(request.destination));
        }
        if !request.approved {
            return Err(PayoutError::NotApproved(request.destination));
        }
        self.check_balance(request.amount).await?;

        let history = self.store.completed_amounts().await?;
        let mut payout = self.build_payout(&request, None, now)?;

        if self.screen.is_anomalous(request.amount.amount(), &history) {
            return Err(self.flag(actor_id, payout).await?);
        }

        if payout.scheduled_for.is_some_and(|at| at > now) {
            self.store.insert(payout.clone()).await?;
            info!(payout_id = %payout.id, scheduled_for = ?payout.scheduled_for, "payout scheduled");
            return Ok(payout);
        }

        payout.status = PayoutStatus::Processing;
        self.store.insert(payout.clone()).await?;
        self.execute(actor_id, payout, now).await
    }

    /// Gates and executes a batch, all-or-nothing before any transfer
    ///
    /// The fraud screen runs every row against the batch's own amount
    /// distribution plus history; one anomalous row flags the whole
    /// batch and nothing transfers. After the gates, rows execute
    /// independently and a per-row failure does not abort the batch.
    #[instrument(skip(self, request), fields(rows = request.rows.len()))]
    pub async fn batch_payout(
        &self,
        actor_id: &str,
        request: BatchPayoutRequest,
        now: DateTime<Utc>,
    ) -> Result<PayoutBatch, PayoutError> {
        if request.rows.is_empty() {
            return Err(PayoutError::Validation("batch has no rows".to_string()));
        }
        for row in &request.rows {
            self.validate_row(&row.destination, &row.amount)?;
        }
        if !request.verified_all {
            return Err(PayoutError::UnverifiedRecipient(
                "batch recipients not verified".to_string(),
            ));
        }
        if !request.approved_all {
            return Err(PayoutError::NotApproved("batch not approved".to_string()));
        }

        let mut total = Money::zero(request.rows[0].amount.currency());
        for row in &request.rows {
            total = total.checked_add(&row.amount)?;
        }
        self.check_balance(total).await?;

        let mut distribution = self.store.completed_amounts().await?;
        distribution.extend(request.rows.iter().map(|r| r.amount.amount()));
        let anomalous = request
            .rows
            .iter()
            .any(|r| self.screen.is_anomalous(r.amount.amount(), &distribution));

        let mut batch = PayoutBatch {
            id: PayoutBatchId::new_v7(),
            total_amount: total,
            row_count: request.rows.len(),
            status: if anomalous {
                BatchStatus::Flagged
            } else {
                BatchStatus::Processing
            },
            failed_payouts: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_batch(batch.clone()).await?;

        if anomalous {
            // Persist every row flagged so review sees the whole batch
            for row in &request.rows {
                let single = SinglePayoutRequest {
                    destination: row.destination.clone(),
                    amount: row.amount,
                    verified: true,
                    approved: true,
                    scheduled_for: request.scheduled_for,
                };
                let mut payout = self.build_payout(&single, Some(batch.id), now)?;
                payout.status = PayoutStatus::Flagged;
                self.store.insert(payout).await?;
            }
            self.audit
                .record(
                    actor_id,
                    "batch_flagged",
                    &format!("batch {} held by fraud screen", batch.id),
                )
                .await
                .map_err(events_to_payout)?;
            warn!(batch_id = %batch.id, "batch flagged, no transfers executed");
            return Ok(batch);
        }

        let mut all_ok = true;
        let mut rows_pending = 0usize;
        for row in &request.rows {
            let single = SinglePayoutRequest {
                destination: row.destination.clone(),
                amount: row.amount,
                verified: true,
                approved: true,
                scheduled_for: request.scheduled_for,
            };
            let mut payout = self.build_payout(&single, Some(batch.id), now)?;

            // future-dated rows wait for the scheduled pass, like singles
            if payout.scheduled_for.is_some_and(|at| at > now) {
                self.store.insert(payout).await?;
                rows_pending += 1;
                continue;
            }

            payout.status = PayoutStatus::Processing;
            self.store.insert(payout.clone()).await?;

            match self.execute(actor_id, payout, now).await {
                Ok(_) => {}
                Err(PayoutError::RailTransfer(_)) => {
                    all_ok = false;
                }
                Err(e) => return Err(e),
            }
        }

        // Failed rows stay queryable on the batch for retry
        for payout in self.store.list_by_batch(batch.id).await? {
            if payout.status == PayoutStatus::Failed {
                batch.failed_payouts.push(payout.id);
            }
        }
        batch.status = if rows_pending > 0 {
            BatchStatus::Processing
        } else if all_ok {
            BatchStatus::Completed
        } else {
            BatchStatus::Failed
        };
        batch.updated_at = now;
        self.store.update_batch(batch.clone()).await?;

        info!(batch_id = %batch.id, status = batch.status.as_str(), "batch payout finished");
        Ok(batch)
    }

    /// Executes scheduled payouts that have come due
    ///
    /// Balance is re-validated per payout at execution time; a payout
    /// the balance can no longer cover stays pending for the next pass.
    #[instrument(skip(self))]
    pub async fn run_scheduled(
        &self,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Payout>, PayoutError> {
        let mut executed = Vec::new();
        for mut payout in self.store.list_due_scheduled(now).await? {
            if !payout.verified || !payout.approved {
                warn!(payout_id = %payout.id, "scheduled payout no longer authorized, skipping");
                continue;
            }
            if let Err(e) = self.check_balance(payout.amount).await {
                warn!(payout_id = %payout.id, error = %e, "balance insufficient, payout stays pending");
                continue;
            }

            let expected_version = payout.version;
            payout.status = PayoutStatus::Processing;
            payout.updated_at = now;
            let payout = match self.store.update(&payout, expected_version).await {
                Ok(p) => p,
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            };

            match self.execute(actor_id, payout, now).await {
                Ok(p) => executed.push(p),
                Err(PayoutError::RailTransfer(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        info!(executed = executed.len(), "scheduled payout pass complete");
        Ok(executed)
    }

    /// Manual override releasing a flagged payout back to pending
    ///
    /// This is the only path out of `Flagged`; the scheduled pass picks
    /// the payout up on its next run.
    #[instrument(skip(self))]
    pub async fn approve_flagged(
        &self,
        actor_id: &str,
        payout_id: PayoutId,
        now: DateTime<Utc>,
    ) -> Result<Payout, PayoutError> {
        let mut payout = self.store.get(payout_id).await?;
        if payout.status != PayoutStatus::Flagged {
            return Err(PayoutError::Validation(format!(
                "payout {} is {}, not flagged",
                payout.id,
                payout.status.as_str()
            )));
        }

        let expected_version = payout.version;
        payout.status = PayoutStatus::Pending;
        payout.scheduled_for = Some(now);
        payout.updated_at = now;
        let payout = self.store.update(&payout, expected_version).await?;

        self.audit
            .record(
                actor_id,
                "approved_flagged_payout",
                &format!("payout {} released for execution", payout.id),
            )
            .await
            .map_err(events_to_payout)?;

        info!(payout_id = %payout.id, "flagged payout approved");
        Ok(payout)
    }

    fn validate_row(&self, destination: &str, amount: &Money) -> Result<(), PayoutError> {
        if destination.trim().is_empty() {
            return Err(PayoutError::Validation(
                "destination must not be empty".to_string(),
            ));
        }
        if !amount.is_positive() {
            return Err(PayoutError::Validation(format!(
                "payout amount must be positive, got {amount}"
            )));
        }
        Ok(())
    }

    async fn check_balance(&self, amount: Money) -> Result<(), PayoutError> {
        let available = self.rail.get_balance().await?;
        if amount > available {
            return Err(PayoutError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    fn build_payout(
        &self,
        request: &SinglePayoutRequest,
        batch_id: Option<PayoutBatchId>,
        now: DateTime<Utc>,
    ) -> Result<Payout, PayoutError> {
        let net = request.amount.checked_sub(&self.rail_fee)?;
        if !net.is_positive() {
            return Err(PayoutError::Validation(format!(
                "amount {} does not cover the rail fee {}",
                request.amount, self.rail_fee
            )));
        }
        Ok(Payout {
            id: PayoutId::new_v7(),
            destination: request.destination.clone(),
            amount: request.amount,
            fee: self.rail_fee,
            net,
            verified: request.verified,
            approved: request.approved,
            scheduled_for: request.scheduled_for,
            idempotency_key: idempotency_key(
                &request.destination,
                &request.amount,
                request.scheduled_for,
            ),
            tx_ref: None,
            batch_id,
            status: PayoutStatus::Pending,
            executed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Persists the flagged payout and returns the error callers see
    async fn flag(&self, actor_id: &str, mut payout: Payout) -> Result<PayoutError, PayoutError> {
        payout.status = PayoutStatus::Flagged;
        self.store.insert(payout.clone()).await?;
        self.audit
            .record(
                actor_id,
                "payout_flagged",
                &format!(
                    "payout {} for {} held by fraud screen",
                    payout.id, payout.amount
                ),
            )
            .await
            .map_err(events_to_payout)?;
        warn!(payout_id = %payout.id, "payout flagged by fraud screen");
        Ok(PayoutError::FraudFlagged {
            payout_id: payout.id,
        })
    }

    /// Runs the rail transfer with bounded retry on transient failures
    ///
    /// The same idempotency key is reused on every retry, so an
    /// unknown-outcome timeout can be retried without risking a double
    /// transfer. A confirmed rejection is terminal.
    async fn execute(
        &self,
        actor_id: &str,
        mut payout: Payout,
        now: DateTime<Utc>,
    ) -> Result<Payout, PayoutError> {
        let mut attempt = 0;
        let outcome = loop {
            match self
                .rail
                .transfer(&payout.destination, payout.net, payout.idempotency_key)
                .await
            {
                Ok(receipt) => break Ok(receipt),
                Err(e) if e.is_transient() && attempt < self.max_transfer_retries => {
                    attempt += 1;
                    warn!(
                        payout_id = %payout.id,
                        attempt,
                        error = %e,
                        "transient rail failure, retrying with the same key"
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => break Err(e),
            }
        };

        let expected_version = payout.version;
        payout.executed_at = Some(now);
        payout.updated_at = now;

        match outcome {
            Ok(receipt) => {
                payout.tx_ref = Some(receipt.tx_ref);
                payout.status = match receipt.status {
                    RailStatus::Confirmed => PayoutStatus::Completed,
                    // Outcome unknown; kept in-flight with its tx_ref for a
                    // later status poll
                    RailStatus::InFlight => PayoutStatus::Processing,
                    RailStatus::Rejected => PayoutStatus::Failed,
                };
                let payout = self.store.update(&payout, expected_version).await?;
                if payout.status == PayoutStatus::Failed {
                    return Err(PayoutError::RailTransfer(format!(
                        "rail rejected payout {}",
                        payout.id
                    )));
                }
                info!(payout_id = %payout.id, tx_ref = ?payout.tx_ref, "payout completed");
                Ok(payout)
            }
            Err(e) => {
                payout.status = PayoutStatus::Failed;
                let payout = self.store.update(&payout, expected_version).await?;
                self.audit
                    .record(
                        actor_id,
                        "payout_failed",
                        &format!("payout {} failed after {} retries: {}", payout.id, attempt, e),
                    )
                    .await
                    .map_err(events_to_payout)?;
                Err(PayoutError::RailTransfer(e.to_string()))
            }
        }
    }
}

/// Deterministic key over (destination, amount, schedule)
fn idempotency_key(
    destination: &str,
    amount: &Money,
    scheduled_for: Option<DateTime<Utc>>,
) -> Uuid {
    let schedule = scheduled_for
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "immediate".to_string());
    let name = format!("{destination}|{}|{schedule}", amount.amount());
    Uuid::new_v5(&PAYOUT_KEY_NAMESPACE, name.as_bytes())
}

fn events_to_payout(e: domain_events::EventsError) -> PayoutError {
    match e {
        domain_events::EventsError::Port(p) => PayoutError::Port(p),
        other => PayoutError::Validation(other.to_string()),
    }
}

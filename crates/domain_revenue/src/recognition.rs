//! Revenue recognition engine
//!
//! Two entry points: `record_issuance` splits a freshly billed invoice
//! into recognized and deferred portions, and `run_amortization`
//! releases open deferrals month by month. Amortization is keyed by
//! (deferred entry, reporting month), so re-running a month draws no
//! slice twice.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, instrument};

use core_kernel::{Money, ReportingMonth};
use domain_invoicing::Invoice;

use crate::entries::{DeferredRevenueEntry, RecognizedRevenueEntry};
use crate::error::RevenueError;
use crate::ports::RevenueStore;

/// Outcome of recognizing an invoice at issuance
#[derive(Debug, Clone)]
pub struct IssuanceSplit {
    pub recognized: Money,
    pub deferred: Money,
}

/// Service recognizing billed revenue over time
pub struct RevenueRecognitionEngine {
    store: Arc<dyn RevenueStore>,
}

impl RevenueRecognitionEngine {
    pub fn new(store: Arc<dyn RevenueStore>) -> Self {
        Self { store }
    }

    /// Splits a billed invoice into recognized and deferred revenue
    ///
    /// Mid-period issuance (any day after the first of the month)
    /// recognizes the elapsed share of the billing period immediately
    /// and defers the remainder over `[now, period_end)`. Issuance on
    /// the first recognizes the full amount. The two portions always
    /// sum to the invoice amount exactly, because the deferred portion
    /// is computed by subtraction.
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id))]
    pub async fn record_issuance(
        &self,
        invoice: &Invoice,
        now: DateTime<Utc>,
    ) -> Result<IssuanceSplit, RevenueError> {
        let period = invoice.period;
        let prorated = now.day() > 1;

        let (recognized, deferred) = if prorated {
            // Periods notionally run month-to-month for accounting, so
            // the elapsed share is the calendar day of issuance.
            let length = i64::from(period.length_days());
            let elapsed = i64::from(now.day()).min(length);
            let recognized = invoice.amount.prorate(elapsed, length)?;
            let deferred = invoice.amount.checked_sub(&recognized)?;
            (recognized, deferred)
        } else {
            (invoice.amount, Money::zero(invoice.amount.currency()))
        };

        self.store
            .insert_recognized(RecognizedRevenueEntry::at_issuance(
                invoice.subscription_id,
                invoice.id,
                recognized,
                prorated,
                now,
            ))
            .await?;

        if !deferred.is_zero() {
            let entry = DeferredRevenueEntry::new(
                invoice.subscription_id,
                invoice.id,
                deferred,
                now,
                period.end(),
            )?;
            self.store.insert_deferred(entry).await?;
        }

        info!(
            recognized = %recognized,
            deferred = %deferred,
            prorated,
            "issuance recognized"
        );
        Ok(IssuanceSplit {
            recognized,
            deferred,
        })
    }

    /// Releases one month of every open deferred entry
    ///
    /// Each entry whose window overlaps the month gets one slice,
    /// weighted by the day-count overlap. The slice that closes a window
    /// is the exact remaining balance rather than a weighted share, so
    /// rounding never strands a residual cent. Returns the number of
    /// slices drawn.
    #[instrument(skip(self))]
    pub async fn run_amortization(
        &self,
        month: ReportingMonth,
        now: DateTime<Utc>,
    ) -> Result<usize, RevenueError> {
        let mut slices = 0;
        for mut entry in self.store.list_open_deferred().await? {
            let overlap = month.overlap_days(entry.window_start, entry.window_end);
            if overlap == 0 {
                continue;
            }
            if self.store.slice_exists(entry.id, month).await? {
                continue;
            }

            let closes = month.closes_window(entry.window_end);
            let slice = if closes {
                entry.remaining()?
            } else {
                let weighted = entry.amount.prorate(overlap, entry.window_days())?;
                let remaining = entry.remaining()?;
                if weighted > remaining { remaining } else { weighted }
            };

            let expected_version = entry.version;
            entry.release(slice, closes)?;
            // CAS before writing the slice: a lost race must not leave
            // an orphan recognized row for the next pass to double-count
            match self.store.update_deferred(&entry, expected_version).await {
                Ok(updated) => entry = updated,
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
            self.store
                .insert_recognized(RecognizedRevenueEntry::amortization_slice(
                    &entry, month, slice, now,
                ))
                .await?;
            slices += 1;
        }

        info!(month = %month, slices, "amortization pass complete");
        Ok(slices)
    }

    /// Total unreleased deferred revenue
    pub async fn deferred_balance(&self, currency: core_kernel::Currency) -> Result<Money, RevenueError> {
        let mut total = Money::zero(currency);
        for balance in self.store.open_deferred_balances().await? {
            total = total.checked_add(&balance)?;
        }
        Ok(total)
    }

    /// Total revenue recognized in one month
    pub async fn recognized_in_month(
        &self,
        month: ReportingMonth,
        currency: core_kernel::Currency,
    ) -> Result<Money, RevenueError> {
        let mut total = Money::zero(currency);
        for entry in self.store.list_recognized_in_month(month).await? {
            total = total.checked_add(&entry.amount)?;
        }
        Ok(total)
    }
}

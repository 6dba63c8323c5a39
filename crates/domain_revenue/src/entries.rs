//! Revenue ledger entries
//!
//! Recognized entries are append-only. Deferred entries accumulate a
//! released total as amortization slices are drawn from them, and close
//! when the released total reaches the deferred amount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    DeferredEntryId, InvoiceId, Money, ReportingMonth, RevenueEntryId, SubscriptionId,
};

use crate::error::RevenueError;

/// Revenue recognized in one reporting month
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedRevenueEntry {
    /// Unique identifier
    pub id: RevenueEntryId,
    /// Subscription the revenue belongs to
    pub subscription_id: SubscriptionId,
    /// Invoice the revenue was billed on
    pub invoice_id: InvoiceId,
    /// Month the revenue is attributed to
    pub month: ReportingMonth,
    /// Recognized amount
    pub amount: Money,
    /// Whether this entry is a mid-period proration at issuance
    pub prorated: bool,
    /// Deferred entry this slice was drawn from, if any
    pub source_deferred: Option<DeferredEntryId>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl RecognizedRevenueEntry {
    /// Records revenue recognized directly at invoice issuance
    pub fn at_issuance(
        subscription_id: SubscriptionId,
        invoice_id: InvoiceId,
        amount: Money,
        prorated: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RevenueEntryId::new_v7(),
            subscription_id,
            invoice_id,
            month: ReportingMonth::from_datetime(now),
            amount,
            prorated,
            source_deferred: None,
            created_at: now,
        }
    }

    /// Records an amortization slice drawn from a deferred entry
    pub fn amortization_slice(
        deferred: &DeferredRevenueEntry,
        month: ReportingMonth,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RevenueEntryId::new_v7(),
            subscription_id: deferred.subscription_id,
            invoice_id: deferred.invoice_id,
            month,
            amount,
            prorated: false,
            source_deferred: Some(deferred.id),
            created_at: now,
        }
    }
}

/// Deferred entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferredStatus {
    /// Still amortizing
    Deferred,
    /// Fully released
    Released,
}

impl DeferredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeferredStatus::Deferred => "deferred",
            DeferredStatus::Released => "released",
        }
    }
}

/// Revenue collected but not yet earned, released over a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredRevenueEntry {
    /// Unique identifier
    pub id: DeferredEntryId,
    /// Subscription the revenue belongs to
    pub subscription_id: SubscriptionId,
    /// Invoice the revenue was billed on
    pub invoice_id: InvoiceId,
    /// Total amount to release over the window
    pub amount: Money,
    /// Sum of slices released so far
    pub released_amount: Money,
    /// Window start (inclusive)
    pub window_start: DateTime<Utc>,
    /// Window end (exclusive)
    pub window_end: DateTime<Utc>,
    /// Status
    pub status: DeferredStatus,
    /// Optimistic concurrency version
    pub version: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl DeferredRevenueEntry {
    /// Opens a deferred entry over `[window_start, window_end)`
    pub fn new(
        subscription_id: SubscriptionId,
        invoice_id: InvoiceId,
        amount: Money,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Self, RevenueError> {
        if window_end <= window_start {
            return Err(RevenueError::Validation(format!(
                "deferral window must not be empty: [{window_start}, {window_end})"
            )));
        }
        if amount.is_negative() {
            return Err(RevenueError::Validation(format!(
                "deferred amount must not be negative, got {amount}"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: DeferredEntryId::new_v7(),
            subscription_id,
            invoice_id,
            amount,
            released_amount: Money::zero(amount.currency()),
            window_start,
            window_end,
            status: DeferredStatus::Deferred,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Total window length in whole days, at least 1
    pub fn window_days(&self) -> i64 {
        (self.window_end - self.window_start).num_days().max(1)
    }

    /// Amount not yet released
    pub fn remaining(&self) -> Result<Money, RevenueError> {
        Ok(self.amount.checked_sub(&self.released_amount)?)
    }

    /// Draws one slice from the entry
    ///
    /// When `closes` is set the entry transitions to `Released` and the
    /// released total must equal the deferred amount exactly; a mismatch
    /// is an internal accounting bug surfaced as
    /// `RevenueError::AmortizationInvariant`.
    pub fn release(&mut self, slice: Money, closes: bool) -> Result<(), RevenueError> {
        if self.status == DeferredStatus::Released {
            return Err(RevenueError::Validation(format!(
                "deferred entry {} already released",
                self.id
            )));
        }
        self.released_amount = self.released_amount.checked_add(&slice)?;
        self.updated_at = Utc::now();
        if closes {
            if self.released_amount != self.amount {
                return Err(RevenueError::AmortizationInvariant {
                    entry_id: self.id,
                    expected: self.amount,
                    released: self.released_amount,
                });
            }
            self.status = DeferredStatus::Released;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn entry(amount: rust_decimal::Decimal, days: i64) -> DeferredRevenueEntry {
        let start = Utc::now();
        DeferredRevenueEntry::new(
            SubscriptionId::new(),
            InvoiceId::new(),
            Money::new(amount, Currency::USDC),
            start,
            start + Duration::days(days),
        )
        .unwrap()
    }

    #[test]
    fn test_release_accumulates_and_closes_exactly() {
        let mut e = entry(dec!(9), 30);
        e.release(Money::new(dec!(4), Currency::USDC), false).unwrap();
        assert_eq!(e.status, DeferredStatus::Deferred);
        assert_eq!(e.remaining().unwrap().amount(), dec!(5));

        e.release(Money::new(dec!(5), Currency::USDC), true).unwrap();
        assert_eq!(e.status, DeferredStatus::Released);
    }

    #[test]
    fn test_closing_short_trips_invariant() {
        let mut e = entry(dec!(9), 30);
        let err = e
            .release(Money::new(dec!(8), Currency::USDC), true)
            .unwrap_err();
        assert!(matches!(err, RevenueError::AmortizationInvariant { .. }));
    }

    #[test]
    fn test_empty_window_rejected() {
        let start = Utc::now();
        let err = DeferredRevenueEntry::new(
            SubscriptionId::new(),
            InvoiceId::new(),
            Money::new(dec!(1), Currency::USDC),
            start,
            start,
        )
        .unwrap_err();
        assert!(matches!(err, RevenueError::Validation(_)));
    }
}

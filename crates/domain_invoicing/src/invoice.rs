//! Invoice aggregate
//!
//! An invoice bills one subscription for one period. The period start is
//! part of the invoice identity: the store enforces at most one invoice
//! per (subscription, period_start).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BillingPeriod, CustomerId, InvoiceId, Money, Rate, SubscriptionId};

use crate::error::InvoicingError;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Issued, awaiting payment
    Open,
    /// Fully paid
    Paid,
    /// Past due date, in dunning
    Overdue,
    /// Voided after dunning exhaustion or manual intervention
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }

    /// Whether the invoice can still receive a payment
    pub fn is_payable(&self) -> bool {
        matches!(self, InvoiceStatus::Open | InvoiceStatus::Overdue)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An invoice billing one subscription period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Human-readable invoice number
    pub invoice_number: String,
    /// Billed subscription
    pub subscription_id: SubscriptionId,
    /// Customer being billed
    pub customer_id: CustomerId,
    /// Issue timestamp
    pub issue_date: DateTime<Utc>,
    /// Billed period; its start is part of the uniqueness key
    pub period: BillingPeriod,
    /// Payment due date (period end)
    pub due_date: DateTime<Utc>,
    /// Billed amount for the period: the base amount, reduced to the
    /// discounted base once the coupon is applied. Never includes tax.
    pub amount: Money,
    /// Tax portion, present once tax has been applied
    pub tax: Option<Money>,
    /// Status
    pub status: InvoiceStatus,
    /// Payment timestamp
    pub paid_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version
    pub version: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates an open invoice for one billing period
    ///
    /// The amount is the subscription's full base amount; proration for
    /// mid-period starts is an accounting concern handled during revenue
    /// recognition, not a billing discount.
    pub fn new(
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
        amount: Money,
        period: BillingPeriod,
        now: DateTime<Utc>,
    ) -> Self {
        let id = InvoiceId::new_v7();
        Self {
            id,
            invoice_number: generate_invoice_number(now),
            subscription_id,
            customer_id,
            issue_date: now,
            period,
            due_date: period.end(),
            amount,
            tax: None,
            status: InvoiceStatus::Open,
            paid_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies the coupon discount and then tax, once
    ///
    /// `amount` becomes the discounted base (`base × (1 − coupon)`) and
    /// `tax = amount × rate` is tracked separately; `total_due` is their
    /// sum. Revenue is recognized against `amount`, never the tax.
    ///
    /// # Errors
    ///
    /// Returns `InvoicingError::InvalidStatus` unless the invoice is
    /// `Open`, and `InvoicingError::TaxAlreadyApplied` on a second call.
    pub fn apply_tax(&mut self, coupon: Rate, rate: Rate) -> Result<(), InvoicingError> {
        if self.status != InvoiceStatus::Open {
            return Err(InvoicingError::InvalidStatus {
                expected: "open",
                found: self.status.as_str(),
            });
        }
        if self.tax.is_some() {
            return Err(InvoicingError::TaxAlreadyApplied(self.id));
        }

        let taxable = coupon.discount(&self.amount);
        let tax = rate.apply(&taxable);
        self.amount = taxable;
        self.tax = Some(tax);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Amount owed by the customer, tax included
    pub fn total_due(&self) -> Money {
        match self.tax {
            Some(tax) => self.amount + tax,
            None => self.amount,
        }
    }

    /// Records full payment
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), InvoicingError> {
        if !self.status.is_payable() {
            return Err(InvoicingError::InvalidStatus {
                expected: "open or overdue",
                found: self.status.as_str(),
            });
        }
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Moves an unpaid invoice past its due date into dunning
    pub fn mark_overdue(&mut self) -> Result<(), InvoicingError> {
        if self.status != InvoiceStatus::Open {
            return Err(InvoicingError::InvalidStatus {
                expected: "open",
                found: self.status.as_str(),
            });
        }
        self.status = InvoiceStatus::Overdue;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Voids the invoice after dunning exhaustion
    pub fn void(&mut self) -> Result<(), InvoicingError> {
        if self.status.is_terminal() {
            return Err(InvoicingError::InvalidStatus {
                expected: "open or overdue",
                found: self.status.as_str(),
            });
        }
        self.status = InvoiceStatus::Void;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the invoice is unpaid and past due at `now`
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Open && now > self.due_date
    }
}

/// Generates a human-readable invoice number
fn generate_invoice_number(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("INV-{}-{}", now.format("%Y%m%d"), &suffix[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn open_invoice(amount: rust_decimal::Decimal) -> Invoice {
        let now = Utc::now();
        Invoice::new(
            SubscriptionId::new(),
            CustomerId::new(),
            Money::new(amount, Currency::USDC),
            BillingPeriod::new(now, 30).unwrap(),
            now,
        )
    }

    #[test]
    fn test_tax_applies_after_coupon_discount() {
        let mut invoice = open_invoice(dec!(100));
        invoice
            .apply_tax(
                Rate::from_percentage(dec!(20)),
                Rate::from_percentage(dec!(10)),
            )
            .unwrap();

        // 100 * 0.8 = 80 discounted base, 80 * 0.1 = 8 tax, 88 due
        assert_eq!(invoice.amount.amount(), dec!(80));
        assert_eq!(invoice.tax.unwrap().amount(), dec!(8));
        assert_eq!(invoice.total_due().amount(), dec!(88));
    }

    #[test]
    fn test_tax_cannot_be_applied_twice() {
        let mut invoice = open_invoice(dec!(100));
        invoice.apply_tax(Rate::zero(), Rate::from_percentage(dec!(10))).unwrap();
        let err = invoice
            .apply_tax(Rate::zero(), Rate::from_percentage(dec!(10)))
            .unwrap_err();
        assert!(matches!(err, InvoicingError::TaxAlreadyApplied(_)));
    }

    #[test]
    fn test_due_date_is_period_end() {
        let invoice = open_invoice(dec!(10));
        assert_eq!(
            invoice.due_date,
            invoice.period.start() + chrono::Duration::days(30)
        );
    }

    #[test]
    fn test_paid_invoice_cannot_be_voided() {
        let mut invoice = open_invoice(dec!(10));
        invoice.mark_paid(Utc::now()).unwrap();
        assert!(invoice.void().is_err());
    }

    #[test]
    fn test_overdue_invoice_can_still_be_paid() {
        let mut invoice = open_invoice(dec!(10));
        invoice.mark_overdue().unwrap();
        invoice.mark_paid(Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.paid_at.is_some());
    }
}

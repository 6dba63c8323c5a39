//! Invoice generation and payment confirmation
//!
//! The generator owns the one-invoice-per-period invariant. Both the
//! explicit `generate` call and the periodic `generate_missing` pass key
//! on the subscription's current billing period, so re-running a pass
//! after a partial failure creates nothing twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use core_kernel::{BillingPeriod, InvoiceId, Money, SubscriptionId};
use domain_subscription::{Subscription, SubscriptionStatus, SubscriptionStore};

use crate::credit_note::CreditNote;
use crate::error::InvoicingError;
use crate::invoice::Invoice;
use crate::ports::{CreditNoteStore, InvoiceStore};

/// Result of confirming a payment: the paid invoice, plus the recovered
/// subscription when confirmation pulled it out of dunning
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub invoice: Invoice,
    pub recovered_subscription: Option<Subscription>,
}

/// Service generating invoices and settling them
pub struct InvoiceGenerator {
    invoices: Arc<dyn InvoiceStore>,
    credit_notes: Arc<dyn CreditNoteStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    period_length_days: u32,
}

impl InvoiceGenerator {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        credit_notes: Arc<dyn CreditNoteStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        period_length_days: u32,
    ) -> Self {
        Self {
            invoices,
            credit_notes,
            subscriptions,
            period_length_days,
        }
    }

    /// Generates the invoice for a subscription's current billing period
    ///
    /// The amount is the full base amount for the period; mid-period
    /// starts are handled by revenue recognition, not by discounting the
    /// invoice.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateInvoice` when the period is already billed and
    /// `Validation` for a canceled subscription.
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        subscription_id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, InvoicingError> {
        let subscription = self.subscriptions.get(subscription_id).await?;
        self.generate_for(&subscription, now).await
    }

    async fn generate_for(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<Invoice, InvoicingError> {
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(InvoicingError::Validation(format!(
                "subscription {} is canceled",
                subscription.id
            )));
        }

        let period = BillingPeriod::current_for(
            subscription.start_date,
            now,
            self.period_length_days,
        )
        .map_err(|e| InvoicingError::Validation(e.to_string()))?;

        if let Some(existing) = self
            .invoices
            .find_by_period(subscription.id, period.start())
            .await?
        {
            return Err(InvoicingError::DuplicateInvoice {
                subscription_id: subscription.id,
                period_start: existing.period.start(),
            });
        }

        let invoice = Invoice::new(
            subscription.id,
            subscription.customer_id,
            subscription.base_amount,
            period,
            now,
        );
        self.invoices.insert(invoice.clone()).await?;

        info!(
            invoice_id = %invoice.id,
            subscription_id = %subscription.id,
            period_start = %period.start(),
            "invoice generated"
        );
        Ok(invoice)
    }

    /// Creates the missing invoice for every billable subscription
    ///
    /// Expired trials are promoted to Active first, so a subscription
    /// that left its trial window since the last pass gets billed in the
    /// same pass. Idempotent: subscriptions already invoiced for their
    /// current period are skipped, so a re-run after partial failure
    /// only fills the remaining gaps. Still-trialing and canceled
    /// subscriptions are not billed.
    #[instrument(skip(self))]
    pub async fn generate_missing(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, InvoicingError> {
        let mut created = Vec::new();
        for mut subscription in self.subscriptions.list_all().await? {
            if subscription.activate_if_trial_elapsed(now) {
                let expected_version = subscription.version;
                match self.subscriptions.update(&subscription, expected_version).await {
                    Ok(updated) => subscription = updated,
                    // a concurrent writer won; the next pass retries
                    Err(e) if e.is_conflict() => continue,
                    Err(e) => return Err(e.into()),
                }
                info!(subscription_id = %subscription.id, "trial promoted to active");
            }
            if !subscription.status.is_billable() {
                continue;
            }
            match self.generate_for(&subscription, now).await {
                Ok(invoice) => created.push(invoice),
                Err(InvoicingError::DuplicateInvoice { .. }) => continue,
                Err(e) => {
                    warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "skipping subscription after generation failure"
                    );
                    continue;
                }
            }
        }
        info!(count = created.len(), "missing-invoice pass complete");
        Ok(created)
    }

    /// Applies coupon and tax to an open invoice, once
    ///
    /// The rate is the subscription's stored rate, resolved at creation.
    #[instrument(skip(self))]
    pub async fn apply_tax(&self, invoice_id: InvoiceId) -> Result<Invoice, InvoicingError> {
        let mut invoice = self.invoices.get(invoice_id).await?;
        let expected_version = invoice.version;
        let subscription = self.subscriptions.get(invoice.subscription_id).await?;

        invoice.apply_tax(subscription.coupon_pct, subscription.tax_rate)?;
        let invoice = self.invoices.update(&invoice, expected_version).await?;

        info!(
            invoice_id = %invoice.id,
            amount = %invoice.amount,
            "tax applied"
        );
        Ok(invoice)
    }

    /// Appends a credit note against a subscription
    #[instrument(skip(self, amount))]
    pub async fn issue_credit_note(
        &self,
        subscription_id: SubscriptionId,
        amount: Money,
        reason: &str,
    ) -> Result<CreditNote, InvoicingError> {
        let subscription = self.subscriptions.get(subscription_id).await?;
        let note = CreditNote::new(subscription.id, subscription.customer_id, amount, reason)?;
        self.credit_notes.insert(note.clone()).await?;

        info!(credit_note_id = %note.id, amount = %note.amount, "credit note issued");
        Ok(note)
    }

    /// Confirms external payment of an invoice
    ///
    /// The invoice moves to `Paid`; a subscription sitting in `PastDue`
    /// because of this invoice recovers to `Active`.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        invoice_id: InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<PaymentConfirmation, InvoicingError> {
        let mut invoice = self.invoices.get(invoice_id).await?;
        let expected_version = invoice.version;

        invoice.mark_paid(now)?;
        let invoice = self.invoices.update(&invoice, expected_version).await?;

        let mut subscription = self.subscriptions.get(invoice.subscription_id).await?;
        let recovered = if subscription.status == SubscriptionStatus::PastDue {
            let sub_version = subscription.version;
            subscription
                .transition_to(SubscriptionStatus::Active)
                .map_err(|e| InvoicingError::Validation(e.to_string()))?;
            Some(self.subscriptions.update(&subscription, sub_version).await?)
        } else {
            None
        };

        info!(
            invoice_id = %invoice.id,
            recovered = recovered.is_some(),
            "payment confirmed"
        );
        Ok(PaymentConfirmation {
            invoice,
            recovered_subscription: recovered,
        })
    }

    /// Retrieves an invoice by ID
    pub async fn get(&self, invoice_id: InvoiceId) -> Result<Invoice, InvoicingError> {
        Ok(self.invoices.get(invoice_id).await?)
    }

    /// All invoices for one subscription
    pub async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Invoice>, InvoicingError> {
        Ok(self.invoices.list_by_subscription(subscription_id).await?)
    }
}

//! BillingEngine facade

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use core_kernel::{
    Currency, CustomerId, InvoiceId, Money, PayoutId, Rate, ReportingMonth, SubscriptionId,
};
use domain_dunning::{CycleReport, DunningScheduler, DunningSchedule, DunningStep, DunningStore};
use domain_events::{
    AuditLog, AuditStore, DispatchReport, NotificationPort, Outbox, OutboxDispatcher, OutboxStore,
    WebhookRegistration,
};
use domain_invoicing::{
    CreditNote, CreditNoteStore, Invoice, InvoiceGenerator, InvoiceStore, PaymentConfirmation,
};
use domain_payout::{
    BatchPayoutRequest, FraudScreen, Payout, PayoutBatch, PayoutProcessor, PayoutStore,
    SettlementRail, SinglePayoutRequest,
};
use domain_revenue::{RevenueRecognitionEngine, RevenueStore};
use domain_subscription::{
    CreateSubscriptionRequest, Customer, CustomerPatch, CustomerStore, Subscription,
    SubscriptionLedger, SubscriptionStatus, SubscriptionStore, TaxPort,
};

use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::EngineError;

/// Every port the engine needs, grouped for wiring
///
/// Production wiring hands over the PostgreSQL stores from
/// `infra_store`; tests hand over the in-memory mocks.
pub struct EnginePorts {
    pub customers: Arc<dyn CustomerStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub credit_notes: Arc<dyn CreditNoteStore>,
    pub revenue: Arc<dyn RevenueStore>,
    pub dunning: Arc<dyn DunningStore>,
    pub payouts: Arc<dyn PayoutStore>,
    pub audit: Arc<dyn AuditStore>,
    pub outbox: Arc<dyn OutboxStore>,
    pub tax: Arc<dyn TaxPort>,
    pub rail: Arc<dyn SettlementRail>,
    pub notifier: Arc<dyn NotificationPort>,
}

/// The single invocation surface over all billing domains
///
/// Holds one instance of each domain service over shared ports. All
/// mutating operations audit under the context's actor and emit outbox
/// events where external listeners care.
pub struct BillingEngine {
    ledger: SubscriptionLedger,
    generator: InvoiceGenerator,
    revenue: RevenueRecognitionEngine,
    dunning: DunningScheduler,
    payouts: PayoutProcessor,
    dispatcher: OutboxDispatcher,
    outbox: Arc<Outbox>,
    audit: Arc<AuditLog>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl BillingEngine {
    /// Wires the domain services from ports and configuration
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` for an unknown currency code or an
    /// invalid dunning schedule.
    pub fn new(
        ports: EnginePorts,
        registrations: Vec<WebhookRegistration>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let currency: Currency = config
            .default_currency
            .parse()
            .map_err(|e| EngineError::Config(format!("default_currency: {e}")))?;
        let schedule = DunningSchedule::new(config.dunning_offsets_days.clone())
            .map_err(|e| EngineError::Config(format!("dunning_offsets_days: {e}")))?;

        let audit = Arc::new(AuditLog::new(ports.audit));
        let outbox = Arc::new(Outbox::new(ports.outbox.clone()));

        let ledger = SubscriptionLedger::new(
            ports.customers.clone(),
            ports.subscriptions.clone(),
            ports.tax,
            Rate::from_percentage(config.default_tax_rate_pct),
        );
        let generator = InvoiceGenerator::new(
            ports.invoices.clone(),
            ports.credit_notes,
            ports.subscriptions.clone(),
            config.period_length_days,
        );
        let revenue = RevenueRecognitionEngine::new(ports.revenue);
        let dunning = DunningScheduler::new(
            ports.dunning,
            ports.invoices,
            ports.subscriptions.clone(),
            ports.customers,
            ports.notifier.clone(),
            audit.clone(),
            outbox.clone(),
            schedule,
        );
        let payouts = PayoutProcessor::new(
            ports.payouts,
            ports.rail,
            audit.clone(),
            FraudScreen::new(config.fraud_threshold),
            Money::new(config.rail_fee, currency),
            config.max_transfer_retries,
            std::time::Duration::from_millis(config.transfer_backoff_ms),
        );
        let dispatcher = OutboxDispatcher::new(
            ports.outbox,
            ports.notifier,
            registrations,
            config.outbox_max_attempts,
            chrono::Duration::seconds(config.outbox_base_backoff_secs),
        );

        Ok(Self {
            ledger,
            generator,
            revenue,
            dunning,
            payouts,
            dispatcher,
            outbox,
            audit,
            subscriptions: ports.subscriptions,
        })
    }

    // --- customers ---

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor_id))]
    pub async fn create_customer(
        &self,
        ctx: &RequestContext,
        name: &str,
        email: &str,
        settlement_address: &str,
        country: &str,
    ) -> Result<Customer, EngineError> {
        let customer = self
            .ledger
            .create_customer(ctx.org_id, name, email, settlement_address, country)
            .await?;
        self.audit
            .record(
                &ctx.actor_id,
                "created_customer",
                &format!("customer {}", customer.id),
            )
            .await?;
        Ok(customer)
    }

    #[instrument(skip(self, ctx, patch), fields(actor = %ctx.actor_id))]
    pub async fn update_customer(
        &self,
        ctx: &RequestContext,
        customer_id: CustomerId,
        patch: CustomerPatch,
    ) -> Result<Customer, EngineError> {
        let customer = self.ledger.update_customer(customer_id, patch).await?;
        self.audit
            .record(
                &ctx.actor_id,
                "updated_customer",
                &format!("customer {}", customer.id),
            )
            .await?;
        Ok(customer)
    }

    // --- subscriptions ---

    /// Creates a subscription and issues its first invoice
    ///
    /// The invoice gets tax applied and its amount split into
    /// recognized and deferred revenue in the same call.
    #[instrument(skip(self, ctx, request), fields(actor = %ctx.actor_id))]
    pub async fn create_subscription(
        &self,
        ctx: &RequestContext,
        request: CreateSubscriptionRequest,
        now: DateTime<Utc>,
    ) -> Result<(Subscription, Invoice), EngineError> {
        let subscription = self.ledger.create(request, now).await?;
        let invoice = self.generator.generate(subscription.id, now).await?;
        let invoice = self.generator.apply_tax(invoice.id).await?;
        self.revenue.record_issuance(&invoice, now).await?;

        self.audit
            .record(
                &ctx.actor_id,
                "created_subscription",
                &format!("subscription {} invoice {}", subscription.id, invoice.id),
            )
            .await?;
        self.outbox
            .enqueue(
                "subscription_created",
                json!({
                    "subscription_id": subscription.id,
                    "customer_id": subscription.customer_id,
                    "plan": subscription.plan,
                }),
                now,
            )
            .await?;

        info!(subscription_id = %subscription.id, "subscription created");
        Ok((subscription, invoice))
    }

    /// Cancels a subscription; repeated calls are no-ops
    #[instrument(skip(self, ctx), fields(actor = %ctx.actor_id))]
    pub async fn cancel_subscription(
        &self,
        ctx: &RequestContext,
        subscription_id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, EngineError> {
        let current = self.ledger.get(subscription_id).await?;
        if current.status == SubscriptionStatus::Canceled {
            return Ok(current);
        }

        let subscription = self.ledger.cancel(subscription_id).await?;
        self.outbox
            .enqueue(
                "sub_cancel",
                json!({
                    "subscription_id": subscription.id,
                    "reason": "requested",
                }),
                now,
            )
            .await?;
        self.audit
            .record(
                &ctx.actor_id,
                "canceled_subscription",
                &format!("subscription {}", subscription.id),
            )
            .await?;
        Ok(subscription)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor_id))]
    pub async fn upgrade_subscription(
        &self,
        ctx: &RequestContext,
        subscription_id: SubscriptionId,
        new_plan: &str,
        new_amount: Money,
    ) -> Result<Subscription, EngineError> {
        let subscription = self
            .ledger
            .upgrade(subscription_id, new_plan, new_amount)
            .await?;
        self.audit
            .record(
                &ctx.actor_id,
                "upgraded_subscription",
                &format!("subscription {} to {}", subscription.id, new_plan),
            )
            .await?;
        Ok(subscription)
    }

    pub async fn get_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Subscription, EngineError> {
        Ok(self.ledger.get(subscription_id).await?)
    }

    // --- invoicing ---

    /// Issues the current-period invoice for one subscription
    #[instrument(skip(self, ctx), fields(actor = %ctx.actor_id))]
    pub async fn generate_invoice(
        &self,
        ctx: &RequestContext,
        subscription_id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, EngineError> {
        let invoice = self.generator.generate(subscription_id, now).await?;
        let invoice = self.generator.apply_tax(invoice.id).await?;
        self.revenue.record_issuance(&invoice, now).await?;
        Ok(invoice)
    }

    /// Issues invoices for every billable subscription with an unbilled
    /// current period; running it twice changes nothing
    #[instrument(skip(self, _ctx))]
    pub async fn generate_missing_invoices(
        &self,
        _ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, EngineError> {
        let created = self.generator.generate_missing(now).await?;
        let mut invoices = Vec::with_capacity(created.len());
        for invoice in created {
            let invoice = self.generator.apply_tax(invoice.id).await?;
            self.revenue.record_issuance(&invoice, now).await?;
            invoices.push(invoice);
        }
        Ok(invoices)
    }

    pub async fn apply_tax(
        &self,
        _ctx: &RequestContext,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, EngineError> {
        Ok(self.generator.apply_tax(invoice_id).await?)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor_id))]
    pub async fn issue_credit_note(
        &self,
        ctx: &RequestContext,
        subscription_id: SubscriptionId,
        amount: Money,
        reason: &str,
    ) -> Result<CreditNote, EngineError> {
        let note = self
            .generator
            .issue_credit_note(subscription_id, amount, reason)
            .await?;
        self.audit
            .record(
                &ctx.actor_id,
                "issued_credit_note",
                &format!("credit note {} over {}", note.id, note.amount),
            )
            .await?;
        Ok(note)
    }

    /// Confirms external payment; a past-due subscription recovers
    #[instrument(skip(self, ctx), fields(actor = %ctx.actor_id))]
    pub async fn confirm_payment(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<PaymentConfirmation, EngineError> {
        let confirmation = self.generator.confirm_payment(invoice_id, now).await?;
        self.outbox
            .enqueue(
                "invoice_paid",
                json!({
                    "invoice_id": confirmation.invoice.id,
                    "amount": confirmation.invoice.amount,
                    "total_due": confirmation.invoice.total_due(),
                    "paid_at": confirmation.invoice.paid_at,
                }),
                now,
            )
            .await?;
        self.audit
            .record(
                &ctx.actor_id,
                "confirmed_payment",
                &format!("invoice {}", confirmation.invoice.id),
            )
            .await?;
        Ok(confirmation)
    }

    pub async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, EngineError> {
        Ok(self.generator.get(invoice_id).await?)
    }

    // --- dunning ---

    pub async fn run_dunning_cycle(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, EngineError> {
        Ok(self.dunning.run_cycle(&ctx.actor_id, now).await?)
    }

    pub async fn dun(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
        attempt_number: u32,
        now: DateTime<Utc>,
    ) -> Result<DunningStep, EngineError> {
        Ok(self
            .dunning
            .dun(&ctx.actor_id, invoice_id, attempt_number, now)
            .await?)
    }

    // --- revenue ---

    /// Draws this month's amortization slice from every open deferral
    pub async fn run_revenue_recognition_cycle(
        &self,
        _ctx: &RequestContext,
        month: ReportingMonth,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        Ok(self.revenue.run_amortization(month, now).await?)
    }

    // --- payouts ---

    pub async fn single_payout(
        &self,
        ctx: &RequestContext,
        request: SinglePayoutRequest,
        now: DateTime<Utc>,
    ) -> Result<Payout, EngineError> {
        Ok(self.payouts.single_payout(&ctx.actor_id, request, now).await?)
    }

    pub async fn batch_payout(
        &self,
        ctx: &RequestContext,
        request: BatchPayoutRequest,
        now: DateTime<Utc>,
    ) -> Result<PayoutBatch, EngineError> {
        Ok(self.payouts.batch_payout(&ctx.actor_id, request, now).await?)
    }

    pub async fn run_scheduled_payouts(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Payout>, EngineError> {
        Ok(self.payouts.run_scheduled(&ctx.actor_id, now).await?)
    }

    pub async fn approve_flagged_payout(
        &self,
        ctx: &RequestContext,
        payout_id: PayoutId,
        now: DateTime<Utc>,
    ) -> Result<Payout, EngineError> {
        Ok(self.payouts.approve_flagged(&ctx.actor_id, payout_id, now).await?)
    }

    // --- events ---

    /// Delivers due outbox entries to the registered webhooks
    pub async fn dispatch_outbox(&self, now: DateTime<Utc>) -> Result<DispatchReport, EngineError> {
        Ok(self.dispatcher.run_pass(now).await?)
    }

    // --- reporting ---

    /// Monthly recurring revenue over active subscriptions
    pub async fn mrr(&self, currency: Currency) -> Result<Money, EngineError> {
        let subscriptions = self.subscriptions.list_all().await?;
        Ok(domain_revenue::mrr(&subscriptions, currency)?)
    }

    /// Share of all subscriptions ever created that are now canceled
    pub async fn churn_rate(&self) -> Result<Decimal, EngineError> {
        let subscriptions = self.subscriptions.list_all().await?;
        Ok(domain_revenue::churn_rate(&subscriptions))
    }

    /// Total unreleased deferred revenue
    pub async fn deferred_balance(&self, currency: Currency) -> Result<Money, EngineError> {
        Ok(self.revenue.deferred_balance(currency).await?)
    }

    /// Total revenue recognized in one reporting month
    pub async fn recognized_in_month(
        &self,
        month: ReportingMonth,
        currency: Currency,
    ) -> Result<Money, EngineError> {
        Ok(self.revenue.recognized_in_month(month, currency).await?)
    }
}

//! End-to-end engine tests over the in-memory adapters

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use core_engine::{BillingEngine, EngineConfig, EnginePorts, JobScheduler, RequestContext, StaticTaxPort};
use core_kernel::{Currency, Money, OrgId, Rate, ReportingMonth};
use domain_dunning::MemoryDunningStore;
use domain_events::{
    MemoryAuditStore, MemoryNotifier, MemoryOutboxStore, OutboxStore, WebhookRegistration,
};
use domain_invoicing::{InvoiceStore, MemoryCreditNoteStore, MemoryInvoiceStore};
use domain_payout::{MemoryPayoutStore, MockRail};
use domain_revenue::MemoryRevenueStore;
use domain_subscription::{MemoryCustomerStore, MemorySubscriptionStore, SubscriptionStatus};
use test_utils::{PayoutRequestBuilder, SubscriptionRequestBuilder};

struct Harness {
    engine: Arc<BillingEngine>,
    invoices: Arc<MemoryInvoiceStore>,
    outbox: Arc<MemoryOutboxStore>,
    audit: Arc<MemoryAuditStore>,
    notifier: Arc<MemoryNotifier>,
    rail: Arc<MockRail>,
}

fn harness(registrations: Vec<WebhookRegistration>) -> Harness {
    let invoices = Arc::new(MemoryInvoiceStore::new());
    let outbox = Arc::new(MemoryOutboxStore::new());
    let audit = Arc::new(MemoryAuditStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let rail = Arc::new(MockRail::with_balance(Money::new(
        dec!(100000),
        Currency::USD,
    )));

    let config = EngineConfig::default();
    let ports = EnginePorts {
        customers: Arc::new(MemoryCustomerStore::new()),
        subscriptions: Arc::new(MemorySubscriptionStore::new()),
        invoices: invoices.clone(),
        credit_notes: Arc::new(MemoryCreditNoteStore::new()),
        revenue: Arc::new(MemoryRevenueStore::new()),
        dunning: Arc::new(MemoryDunningStore::new()),
        payouts: Arc::new(MemoryPayoutStore::new()),
        audit: audit.clone(),
        outbox: outbox.clone(),
        tax: Arc::new(StaticTaxPort::new(Rate::from_percentage(dec!(10)))),
        rail: rail.clone(),
        notifier: notifier.clone(),
    };

    let engine = Arc::new(BillingEngine::new(ports, registrations, &config).unwrap());
    Harness {
        engine,
        invoices,
        outbox,
        audit,
        notifier,
        rail,
    }
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::new("ops@example.com", OrgId::new())
}

async fn subscribe(
    h: &Harness,
    ctx: &RequestContext,
    amount: Money,
    now: DateTime<Utc>,
) -> (domain_subscription::Subscription, domain_invoicing::Invoice) {
    let customer = h
        .engine
        .create_customer(ctx, "Acme Corp", "billing@acme.test", "0xabc", "US")
        .await
        .unwrap();
    h.engine
        .create_subscription(
            ctx,
            SubscriptionRequestBuilder::new()
                .with_customer_id(customer.id)
                .with_base_amount(amount)
                .build(),
            now,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_subscription_issues_taxed_invoice_and_splits_revenue() {
    let h = harness(Vec::new());
    let ctx = ctx();
    let now = at(2024, 3, 16);

    let (subscription, invoice) = subscribe(&h, &ctx, Money::new(dec!(30), Currency::USD), now).await;

    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert_eq!(invoice.amount, Money::new(dec!(30), Currency::USD));
    assert_eq!(invoice.tax, Some(Money::new(dec!(3), Currency::USD)));

    // amount splits exactly between recognized and deferred
    let recognized = h
        .engine
        .recognized_in_month(ReportingMonth::new(2024, 3).unwrap(), Currency::USD)
        .await
        .unwrap();
    let deferred = h.engine.deferred_balance(Currency::USD).await.unwrap();
    assert_eq!(
        recognized.checked_add(&deferred).unwrap(),
        Money::new(dec!(30), Currency::USD)
    );
    assert_eq!(recognized, Money::new(dec!(16), Currency::USD));

    let records = h.audit.records().await;
    assert!(records
        .iter()
        .any(|r| r.action == "created_subscription" && r.actor_id == "ops@example.com"));
}

#[tokio::test]
async fn test_cancel_subscription_emits_one_event() {
    let h = harness(Vec::new());
    let ctx = ctx();
    let now = at(2024, 1, 1);

    let (subscription, _) = subscribe(&h, &ctx, Money::new(dec!(10), Currency::USD), now).await;

    let first = h.engine.cancel_subscription(&ctx, subscription.id, now).await.unwrap();
    let second = h.engine.cancel_subscription(&ctx, subscription.id, now).await.unwrap();
    assert_eq!(first.status, SubscriptionStatus::Canceled);
    assert_eq!(second.status, SubscriptionStatus::Canceled);

    let pending = h.outbox.list_due(now + Duration::days(1)).await.unwrap();
    let cancel_events = pending.iter().filter(|e| e.event == "sub_cancel").count();
    assert_eq!(cancel_events, 1);
}

#[tokio::test]
async fn test_tick_is_idempotent_and_drives_dunning() {
    let h = harness(Vec::new());
    let ctx = ctx();
    let now = at(2024, 1, 1);

    let (subscription, _) = subscribe(&h, &ctx, Money::new(dec!(20), Currency::USD), now).await;

    let scheduler = JobScheduler::new(h.engine.clone(), std::time::Duration::from_secs(300));

    // second period unbilled, first invoice past due, only retry offset 1 elapsed
    let later = at(2024, 2, 2);
    scheduler.tick(later).await;
    scheduler.tick(later).await;

    let invoices = h.invoices.list_by_subscription(subscription.id).await.unwrap();
    assert_eq!(invoices.len(), 2);

    // first invoice went overdue and got a collection email, once
    let reminders = h
        .notifier
        .emails()
        .await
        .iter()
        .filter(|(_, subject, _)| subject.starts_with("Payment reminder"))
        .count();
    assert_eq!(reminders, 1);
}

#[tokio::test]
async fn test_confirm_payment_dispatches_webhook() {
    let h = harness(vec![WebhookRegistration {
        event: "invoice_paid".to_string(),
        url: "https://listener.test/billing".to_string(),
    }]);
    let ctx = ctx();
    let now = at(2024, 1, 1);

    let (_, invoice) = subscribe(&h, &ctx, Money::new(dec!(10), Currency::USD), now).await;

    h.engine.confirm_payment(&ctx, invoice.id, now).await.unwrap();
    let report = h.engine.dispatch_outbox(now + Duration::seconds(1)).await.unwrap();
    assert!(report.delivered >= 1);

    let webhooks = h.notifier.webhooks().await;
    assert!(webhooks
        .iter()
        .any(|(url, payload)| url == "https://listener.test/billing"
            && payload["event"] == "invoice_paid"));
}

#[tokio::test]
async fn test_single_payout_through_engine() {
    let h = harness(Vec::new());
    let ctx = ctx();
    let now = at(2024, 1, 1);

    let payout = h
        .engine
        .single_payout(
            &ctx,
            PayoutRequestBuilder::new()
                .with_destination("0xdeadbeef")
                .with_amount(Money::new(dec!(50), Currency::USD))
                .build(),
            now,
        )
        .await
        .unwrap();

    assert_eq!(payout.status, domain_payout::PayoutStatus::Completed);
    assert_eq!(h.rail.transfer_count().await, 1);
}

#[tokio::test]
async fn test_mrr_counts_only_active_subscriptions() {
    let h = harness(Vec::new());
    let ctx = ctx();
    let now = at(2024, 1, 1);

    let (first, _) = subscribe(&h, &ctx, Money::new(dec!(30), Currency::USD), now).await;
    let (_second, _) = subscribe(&h, &ctx, Money::new(dec!(20), Currency::USD), now).await;

    h.engine.cancel_subscription(&ctx, first.id, now).await.unwrap();

    let mrr = h.engine.mrr(Currency::USD).await.unwrap();
    assert_eq!(mrr, Money::new(dec!(20), Currency::USD));
    assert_eq!(h.engine.churn_rate().await.unwrap(), dec!(0.5));
}

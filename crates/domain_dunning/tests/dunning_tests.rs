//! Dunning cycle integration tests

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use core_kernel::{BillingPeriod, Currency, Money, OrgId, Rate};
use domain_dunning::{
    DunningError, DunningScheduler, DunningSchedule, DunningStore, MemoryDunningStore,
};
use domain_events::{
    AuditLog, MemoryAuditStore, MemoryNotifier, MemoryOutboxStore, Outbox, OutboxStore,
};
use domain_invoicing::{Invoice, InvoiceStatus, InvoiceStore, MemoryInvoiceStore};
use domain_subscription::ports::mock::{MemoryCustomerStore, MemorySubscriptionStore};
use domain_subscription::{
    CreateSubscriptionRequest, Customer, CustomerStore, Subscription, SubscriptionStatus,
    SubscriptionStore,
};

struct Harness {
    scheduler: DunningScheduler,
    attempts: Arc<MemoryDunningStore>,
    invoices: Arc<MemoryInvoiceStore>,
    subscriptions: Arc<MemorySubscriptionStore>,
    customers: Arc<MemoryCustomerStore>,
    notifier: Arc<MemoryNotifier>,
    outbox_store: Arc<MemoryOutboxStore>,
}

fn harness() -> Harness {
    let attempts = Arc::new(MemoryDunningStore::new());
    let invoices = Arc::new(MemoryInvoiceStore::new());
    let subscriptions = Arc::new(MemorySubscriptionStore::new());
    let customers = Arc::new(MemoryCustomerStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let outbox_store = Arc::new(MemoryOutboxStore::new());

    let scheduler = DunningScheduler::new(
        attempts.clone(),
        invoices.clone(),
        subscriptions.clone(),
        customers.clone(),
        notifier.clone(),
        Arc::new(AuditLog::new(Arc::new(MemoryAuditStore::new()))),
        Arc::new(Outbox::new(outbox_store.clone())),
        DunningSchedule::default(),
    );

    Harness {
        scheduler,
        attempts,
        invoices,
        subscriptions,
        customers,
        notifier,
        outbox_store,
    }
}

/// Seeds an active subscription with an invoice issued at `issued`
async fn seed(h: &Harness, issued: DateTime<Utc>, auto_dunning: bool) -> (Subscription, Invoice) {
    let customer = Customer::new(
        OrgId::new(),
        "Ada",
        "ada@example.com",
        "3Lq9vWyAddr",
        "US",
    );
    h.customers.insert(customer.clone()).await.unwrap();

    let sub = Subscription::new(
        CreateSubscriptionRequest {
            customer_id: customer.id,
            plan: "Creator".to_string(),
            base_amount: Money::new(dec!(25), Currency::USDC),
            trial_days: 0,
            coupon_pct: Rate::zero(),
            entitlement: "Creator Tools".to_string(),
            auto_dunning,
        },
        Rate::zero(),
        issued,
    );
    h.subscriptions.insert(sub.clone()).await.unwrap();

    let invoice = Invoice::new(
        sub.id,
        customer.id,
        sub.base_amount,
        BillingPeriod::new(issued, 30).unwrap(),
        issued,
    );
    h.invoices.insert(invoice.clone()).await.unwrap();
    (sub, invoice)
}

fn jan(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn test_cycle_before_due_date_does_nothing() {
    let h = harness();
    let (_, invoice) = seed(&h, jan(1), true).await;

    let report = h.scheduler.run_cycle("system", jan(15)).await.unwrap();

    assert_eq!(report.marked_overdue, 0);
    assert!(report.attempts.is_empty());
    assert_eq!(
        h.invoices.get(invoice.id).await.unwrap().status,
        InvoiceStatus::Open
    );
}

#[tokio::test]
async fn test_cycle_past_first_offset_takes_attempt_one() {
    let h = harness();
    // Issued Jan 1, due Jan 31; first attempt due Feb 1
    let (sub, invoice) = seed(&h, jan(1), true).await;

    let now = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();
    let report = h.scheduler.run_cycle("system", now).await.unwrap();

    assert_eq!(report.marked_overdue, 1);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].attempt_number, 1);

    assert_eq!(
        h.invoices.get(invoice.id).await.unwrap().status,
        InvoiceStatus::Overdue
    );
    assert_eq!(
        h.subscriptions.get(sub.id).await.unwrap().status,
        SubscriptionStatus::PastDue
    );
    assert_eq!(h.notifier.emails().await.len(), 1);
}

#[tokio::test]
async fn test_repeated_cycle_does_not_duplicate_attempts() {
    let h = harness();
    let (_, invoice) = seed(&h, jan(1), true).await;
    let now = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();

    h.scheduler.run_cycle("system", now).await.unwrap();
    let second = h.scheduler.run_cycle("system", now).await.unwrap();

    assert!(second.attempts.is_empty());
    assert_eq!(h.attempts.last_attempt_number(invoice.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_attempts_follow_schedule_strictly() {
    let h = harness();
    let (_, invoice) = seed(&h, jan(1), true).await;
    let due = jan(31);

    // Offsets +1, +3, +7: attempts land on Feb 1, Feb 3, Feb 7
    for (day_offset, expected) in [(1, 1u32), (2, 1), (3, 2), (7, 3)] {
        h.scheduler
            .run_cycle("system", due + Duration::days(day_offset))
            .await
            .unwrap();
        assert_eq!(
            h.attempts.last_attempt_number(invoice.id).await.unwrap(),
            expected,
            "after day +{day_offset}"
        );
    }
}

#[tokio::test]
async fn test_exhaustion_voids_invoice_and_cancels_subscription() {
    let h = harness();
    let (sub, invoice) = seed(&h, jan(1), true).await;
    let due = jan(31);

    for day_offset in [1, 3, 7] {
        h.scheduler
            .run_cycle("system", due + Duration::days(day_offset))
            .await
            .unwrap();
    }
    // Schedule spent; the next cycle exhausts
    let report = h
        .scheduler
        .run_cycle("system", due + Duration::days(8))
        .await
        .unwrap();

    assert_eq!(report.voided, vec![invoice.id]);
    assert_eq!(
        h.invoices.get(invoice.id).await.unwrap().status,
        InvoiceStatus::Void
    );
    assert_eq!(
        h.subscriptions.get(sub.id).await.unwrap().status,
        SubscriptionStatus::Canceled
    );

    let due_events = h.outbox_store.list_due(Utc::now()).await.unwrap();
    assert_eq!(due_events.len(), 1);
    assert_eq!(due_events[0].event, "sub_cancel");
}

#[tokio::test]
async fn test_auto_dunning_disabled_is_left_alone() {
    let h = harness();
    let (sub, invoice) = seed(&h, jan(1), false).await;

    let now = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();
    let report = h.scheduler.run_cycle("system", now).await.unwrap();

    // Overdue marking still happens, but no attempt is taken
    assert_eq!(report.marked_overdue, 1);
    assert!(report.attempts.is_empty());
    assert_eq!(h.attempts.last_attempt_number(invoice.id).await.unwrap(), 0);
    assert_eq!(
        h.subscriptions.get(sub.id).await.unwrap().status,
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn test_manual_dun_validates_attempt_number() {
    let h = harness();
    let (_, invoice) = seed(&h, jan(1), true).await;
    let now = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();

    // Not overdue yet
    let err = h
        .scheduler
        .dun("admin", invoice.id, 1, jan(15))
        .await
        .unwrap_err();
    assert!(matches!(err, DunningError::Validation(_)));

    h.scheduler.run_cycle("system", now).await.unwrap();

    // Cycle already took attempt 1; repeating it is rejected
    let err = h.scheduler.dun("admin", invoice.id, 1, now).await.unwrap_err();
    assert!(matches!(err, DunningError::Validation(_)));

    // Skipping ahead is rejected too
    let err = h.scheduler.dun("admin", invoice.id, 3, now).await.unwrap_err();
    assert!(matches!(err, DunningError::Validation(_)));

    let step = h.scheduler.dun("admin", invoice.id, 2, now).await.unwrap();
    assert_eq!(step.attempt_number, 2);
}

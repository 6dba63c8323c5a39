//! Invoicing domain integration tests

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, Rate};
use domain_invoicing::{
    InvoiceGenerator, InvoiceStatus, InvoicingError, MemoryCreditNoteStore, MemoryInvoiceStore,
};
use domain_subscription::ports::mock::MemorySubscriptionStore;
use domain_subscription::{
    CreateSubscriptionRequest, Subscription, SubscriptionStatus, SubscriptionStore,
};

struct Harness {
    generator: InvoiceGenerator,
    subscriptions: Arc<MemorySubscriptionStore>,
}

fn harness() -> Harness {
    let subscriptions = Arc::new(MemorySubscriptionStore::new());
    let generator = InvoiceGenerator::new(
        Arc::new(MemoryInvoiceStore::new()),
        Arc::new(MemoryCreditNoteStore::new()),
        subscriptions.clone(),
        30,
    );
    Harness {
        generator,
        subscriptions,
    }
}

async fn seed_subscription(
    store: &MemorySubscriptionStore,
    coupon_pct: Rate,
    tax_rate: Rate,
) -> Subscription {
    let sub = Subscription::new(
        CreateSubscriptionRequest {
            customer_id: core_kernel::CustomerId::new(),
            plan: "Creator".to_string(),
            base_amount: Money::new(dec!(100), Currency::USDC),
            trial_days: 0,
            coupon_pct,
            entitlement: "Creator Tools".to_string(),
            auto_dunning: true,
        },
        tax_rate,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    store.insert(sub.clone()).await.unwrap();
    sub
}

async fn seed_trial_subscription(
    store: &MemorySubscriptionStore,
    trial_days: u32,
) -> Subscription {
    let sub = Subscription::new(
        CreateSubscriptionRequest {
            customer_id: core_kernel::CustomerId::new(),
            plan: "Creator".to_string(),
            base_amount: Money::new(dec!(100), Currency::USDC),
            trial_days,
            coupon_pct: Rate::zero(),
            entitlement: "Creator Tools".to_string(),
            auto_dunning: true,
        },
        Rate::zero(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    store.insert(sub.clone()).await.unwrap();
    sub
}

#[tokio::test]
async fn test_generate_bills_current_period() {
    let h = harness();
    let sub = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;

    // Two periods after the anchor the bill covers the third period
    let now = sub.start_date + Duration::days(65);
    let invoice = h.generator.generate(sub.id, now).await.unwrap();

    assert_eq!(invoice.period.start(), sub.start_date + Duration::days(60));
    assert_eq!(invoice.due_date, sub.start_date + Duration::days(90));
    assert_eq!(invoice.amount.amount(), dec!(100));
    assert_eq!(invoice.status, InvoiceStatus::Open);
}

#[tokio::test]
async fn test_generate_rejects_duplicate_period() {
    let h = harness();
    let sub = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;
    let now = sub.start_date + Duration::days(5);

    h.generator.generate(sub.id, now).await.unwrap();
    let err = h
        .generator
        .generate(sub.id, now + Duration::days(3))
        .await
        .unwrap_err();

    assert!(matches!(err, InvoicingError::DuplicateInvoice { .. }));
}

#[tokio::test]
async fn test_generate_missing_is_idempotent() {
    let h = harness();
    let a = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;
    let b = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;
    let now = a.start_date + Duration::days(10);

    let first = h.generator.generate_missing(now).await.unwrap();
    assert_eq!(first.len(), 2);

    let second = h.generator.generate_missing(now).await.unwrap();
    assert!(second.is_empty());

    assert_eq!(h.generator.list_by_subscription(a.id).await.unwrap().len(), 1);
    assert_eq!(h.generator.list_by_subscription(b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_generate_missing_skips_trialing_and_canceled() {
    let h = harness();
    let active = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;
    let trialing = seed_trial_subscription(&h.subscriptions, 14).await;

    let mut canceled = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;
    canceled.cancel();
    h.subscriptions.update(&canceled, 0).await.unwrap();

    let created = h
        .generator
        .generate_missing(active.start_date + Duration::days(1))
        .await
        .unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].subscription_id, active.id);
    let still_trialing = h.subscriptions.get(trialing.id).await.unwrap();
    assert_eq!(still_trialing.status, SubscriptionStatus::Trialing);
}

#[tokio::test]
async fn test_generate_missing_promotes_expired_trials() {
    let h = harness();
    let trial = seed_trial_subscription(&h.subscriptions, 14).await;
    assert_eq!(trial.status, SubscriptionStatus::Trialing);

    // 40 days in: the trial ended on day 14, the second period is due
    let now = trial.start_date + Duration::days(40);
    let created = h.generator.generate_missing(now).await.unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].subscription_id, trial.id);
    assert_eq!(created[0].period.start(), trial.start_date + Duration::days(30));

    let promoted = h.subscriptions.get(trial.id).await.unwrap();
    assert_eq!(promoted.status, SubscriptionStatus::Active);

    // the promotion sticks: a re-run bills nothing further
    assert!(h.generator.generate_missing(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_tax_discounts_coupon_first() {
    let h = harness();
    let sub = seed_subscription(
        &h.subscriptions,
        Rate::from_percentage(dec!(20)),
        Rate::from_percentage(dec!(10)),
    )
    .await;
    let invoice = h
        .generator
        .generate(sub.id, sub.start_date + Duration::days(1))
        .await
        .unwrap();

    let taxed = h.generator.apply_tax(invoice.id).await.unwrap();

    assert_eq!(taxed.amount.amount(), dec!(80));
    assert_eq!(taxed.tax.unwrap().amount(), dec!(8));
    assert_eq!(taxed.total_due().amount(), dec!(88));
    assert_eq!(taxed.version, 1);

    let err = h.generator.apply_tax(invoice.id).await.unwrap_err();
    assert!(matches!(err, InvoicingError::TaxAlreadyApplied(_)));
}

#[tokio::test]
async fn test_confirm_payment_recovers_past_due_subscription() {
    let h = harness();
    let mut sub = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;
    let invoice = h
        .generator
        .generate(sub.id, sub.start_date + Duration::days(1))
        .await
        .unwrap();

    sub.transition_to(SubscriptionStatus::PastDue).unwrap();
    h.subscriptions.update(&sub, 0).await.unwrap();

    let confirmation = h
        .generator
        .confirm_payment(invoice.id, Utc::now())
        .await
        .unwrap();

    assert_eq!(confirmation.invoice.status, InvoiceStatus::Paid);
    let recovered = confirmation.recovered_subscription.unwrap();
    assert_eq!(recovered.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_credit_note_requires_positive_amount() {
    let h = harness();
    let sub = seed_subscription(&h.subscriptions, Rate::zero(), Rate::zero()).await;

    let err = h
        .generator
        .issue_credit_note(sub.id, Money::new(dec!(-5), Currency::USDC), "refund")
        .await
        .unwrap_err();
    assert!(matches!(err, InvoicingError::Validation(_)));

    let note = h
        .generator
        .issue_credit_note(sub.id, Money::new(dec!(5), Currency::USDC), "goodwill")
        .await
        .unwrap();
    assert_eq!(note.amount.amount(), dec!(5));
}

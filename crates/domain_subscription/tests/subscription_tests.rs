//! Subscription domain integration tests

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, OrgId, Rate};
use domain_subscription::ports::mock::{
    FixedTaxPort, MemoryCustomerStore, MemorySubscriptionStore,
};
use domain_subscription::{
    CreateSubscriptionRequest, CustomerPatch, SubscriptionError, SubscriptionLedger,
    SubscriptionStatus,
};

fn ledger_with_tax(tax: FixedTaxPort) -> SubscriptionLedger {
    SubscriptionLedger::new(
        Arc::new(MemoryCustomerStore::new()),
        Arc::new(MemorySubscriptionStore::new()),
        Arc::new(tax),
        Rate::from_percentage(dec!(10)),
    )
}

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn request(
    customer_id: core_kernel::CustomerId,
    trial_days: u32,
    coupon_pct: Rate,
) -> CreateSubscriptionRequest {
    CreateSubscriptionRequest {
        customer_id,
        plan: "Creator".to_string(),
        base_amount: Money::new(dec!(25.0), Currency::USDC),
        trial_days,
        coupon_pct,
        entitlement: "Creator Tools".to_string(),
        auto_dunning: true,
    }
}

#[tokio::test]
async fn test_create_subscription_resolves_tax_from_port() {
    let ledger = ledger_with_tax(FixedTaxPort::with_rate(Rate::from_percentage(dec!(20))));
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "gb")
        .await
        .unwrap();

    let sub = ledger.create(request(customer.id, 0, Rate::zero()), anchor()).await.unwrap();

    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.tax_rate.as_percentage(), dec!(20));
}

#[tokio::test]
async fn test_create_anchors_billing_to_caller_time() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "US")
        .await
        .unwrap();

    // the caller's clock, not the wall clock, sets the billing anchor
    let sub = ledger.create(request(customer.id, 0, Rate::zero()), anchor()).await.unwrap();

    assert_eq!(sub.start_date, anchor());
    assert_eq!(sub.last_bill_date, anchor());
}

#[tokio::test]
async fn test_tax_port_failure_falls_back_to_default_rate() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "GB")
        .await
        .unwrap();

    let sub = ledger.create(request(customer.id, 0, Rate::zero()), anchor()).await.unwrap();

    assert_eq!(sub.tax_rate.as_percentage(), dec!(10));
}

#[tokio::test]
async fn test_trial_subscription_starts_trialing() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "US")
        .await
        .unwrap();

    let sub = ledger.create(request(customer.id, 14, Rate::zero()), anchor()).await.unwrap();

    assert_eq!(sub.status, SubscriptionStatus::Trialing);
    assert!(sub.trial_end() > sub.start_date);
}

#[tokio::test]
async fn test_create_rejects_unknown_customer() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let err = ledger
        .create(request(core_kernel::CustomerId::new(), 0, Rate::zero()), anchor())
        .await
        .unwrap_err();

    assert!(matches!(err, SubscriptionError::NotFound(_)));
}

#[tokio::test]
async fn test_create_rejects_out_of_range_coupon() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "US")
        .await
        .unwrap();

    let err = ledger
        .create(request(customer.id, 0, Rate::new(dec!(1.5))), anchor())
        .await
        .unwrap_err();

    assert!(matches!(err, SubscriptionError::Validation(_)));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "US")
        .await
        .unwrap();
    let sub = ledger.create(request(customer.id, 0, Rate::zero()), anchor()).await.unwrap();

    let first = ledger.cancel(sub.id).await.unwrap();
    assert_eq!(first.status, SubscriptionStatus::Canceled);
    assert_eq!(first.version, 1);

    // Second cancel is a no-op and does not bump the version
    let second = ledger.cancel(sub.id).await.unwrap();
    assert_eq!(second.status, SubscriptionStatus::Canceled);
    assert_eq!(second.version, 1);
}

#[tokio::test]
async fn test_upgrade_preserves_billing_anchor() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "US")
        .await
        .unwrap();
    let sub = ledger.create(request(customer.id, 0, Rate::zero()), anchor()).await.unwrap();

    let upgraded = ledger
        .upgrade(sub.id, "Pro", Money::new(dec!(50.0), Currency::USDC))
        .await
        .unwrap();

    assert_eq!(upgraded.plan, "Pro");
    assert_eq!(upgraded.base_amount.amount(), dec!(50.0));
    assert_eq!(upgraded.start_date, sub.start_date);
    assert_eq!(upgraded.last_bill_date, sub.last_bill_date);
    assert_eq!(upgraded.version, 1);
}

#[tokio::test]
async fn test_upgrade_canceled_subscription_fails() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "US")
        .await
        .unwrap();
    let sub = ledger.create(request(customer.id, 0, Rate::zero()), anchor()).await.unwrap();
    ledger.cancel(sub.id).await.unwrap();

    let err = ledger
        .upgrade(sub.id, "Pro", Money::new(dec!(50.0), Currency::USDC))
        .await
        .unwrap_err();

    assert!(matches!(err, SubscriptionError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_customer_patch_updates_contact_fields() {
    let ledger = ledger_with_tax(FixedTaxPort::failing());
    let customer = ledger
        .create_customer(OrgId::new(), "Ada", "ada@example.com", "3Lq9vWyAddr", "us")
        .await
        .unwrap();
    assert_eq!(customer.country, "US");

    let patched = ledger
        .update_customer(
            customer.id,
            CustomerPatch {
                email: Some("ada@new.example.com".to_string()),
                settlement_address: Some("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string()),
                country: Some("de".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(patched.email, "ada@new.example.com");
    assert_eq!(patched.country, "DE");
    assert_eq!(
        patched.settlement_address,
        "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"
    );
    assert_eq!(patched.name, "Ada");
}

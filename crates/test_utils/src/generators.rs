//! Property-Based Test Generators
//!
//! Proptest strategies for generating random test data that maintains
//! domain invariants.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{BillingPeriod, Currency, Money, Rate, ReportingMonth};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::USDC),
    ]
}

/// Strategy for positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000i64
}

/// Strategy for positive Money values
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (positive_amount_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Strategy for positive USD Money values
pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|amount| Money::from_minor(amount, Currency::USD))
}

/// Strategy for rates in [0, 1] with four decimal places
pub fn rate_strategy() -> impl Strategy<Value = Rate> {
    (0u32..=10000u32).prop_map(|n| Rate::new(Decimal::new(i64::from(n), 4)))
}

/// Strategy for billing periods of 1 to 366 days starting in 2024
pub fn billing_period_strategy() -> impl Strategy<Value = BillingPeriod> {
    (0i64..365i64, 1u32..=366u32).prop_map(|(offset_days, length)| {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::days(offset_days);
        BillingPeriod::new(start, length).unwrap()
    })
}

/// Strategy for reporting months across a few years
pub fn reporting_month_strategy() -> impl Strategy<Value = ReportingMonth> {
    (2020i32..2030i32, 1u32..=12u32).prop_map(|(year, month)| {
        ReportingMonth::new(year, month).unwrap()
    })
}

/// Strategy for timestamps inside 2024
pub fn datetime_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..366i64, 0u32..24u32).prop_map(|(day, hour)| {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap() + chrono::Duration::days(day)
    })
}

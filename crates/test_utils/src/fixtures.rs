//! Pre-built Test Fixtures
//!
//! Ready-to-use test data for common entities across the billing
//! system. Fixtures are consistent and predictable so tests can assert
//! exact values.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{Currency, CustomerId, InvoiceId, Money, OrgId, Rate, SubscriptionId};
use once_cell::sync::Lazy;
use rust_decimal_macros::dec;

/// Billing anchor shared by temporal fixtures: 2024-01-01T00:00:00Z
pub static BILLING_ANCHOR: Lazy<DateTime<Utc>> =
    Lazy::new(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// A standard monthly base amount
    pub fn usd_30() -> Money {
        Money::new(dec!(30.00), Currency::USD)
    }

    /// An amount that does not divide evenly over a 30-day period
    pub fn usd_odd() -> Money {
        Money::new(dec!(73.37), Currency::USD)
    }

    /// A zero amount
    pub fn usd_zero() -> Money {
        Money::zero(Currency::USD)
    }

    /// A EUR amount for currency mismatch tests
    pub fn eur_30() -> Money {
        Money::new(dec!(30.00), Currency::EUR)
    }

    /// A USDC amount (six decimal places)
    pub fn usdc_micro() -> Money {
        Money::new(dec!(0.000001), Currency::USDC)
    }
}

/// Fixture for Rate test data
pub struct RateFixtures;

impl RateFixtures {
    /// The default fallback tax rate
    pub fn ten_percent() -> Rate {
        Rate::from_percentage(dec!(10))
    }

    /// A half-off coupon
    pub fn half_off() -> Rate {
        Rate::new(dec!(0.5))
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Start of the canonical test year
    pub fn anchor() -> DateTime<Utc> {
        *BILLING_ANCHOR
    }

    /// Noon on the 15th, mid-period relative to the anchor
    pub fn mid_month() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    /// Noon on an arbitrary day of the anchor month
    pub fn day(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }
}

/// Fixture for typed IDs
pub struct IdFixtures;

impl IdFixtures {
    pub fn org_id() -> OrgId {
        OrgId::new()
    }

    pub fn customer_id() -> CustomerId {
        CustomerId::new()
    }

    pub fn subscription_id() -> SubscriptionId {
        SubscriptionId::new()
    }

    pub fn invoice_id() -> InvoiceId {
        InvoiceId::new()
    }
}

/// Fixture for common string data
pub struct StringFixtures;

impl StringFixtures {
    pub fn plan() -> &'static str {
        "pro-monthly"
    }

    pub fn email() -> &'static str {
        "billing@acme.test"
    }

    pub fn settlement_address() -> &'static str {
        "0x00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee"
    }

    pub fn country() -> &'static str {
        "US"
    }
}

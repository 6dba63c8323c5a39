//! Test Data Builders
//!
//! Builder patterns for constructing test data with sensible defaults.
//! Tests specify only the fields they care about.

use chrono::{DateTime, Utc};
use core_kernel::{BillingPeriod, CustomerId, Money, Rate, SubscriptionId};
use domain_invoicing::Invoice;
use domain_payout::SinglePayoutRequest;
use domain_subscription::CreateSubscriptionRequest;

use crate::fixtures::{IdFixtures, MoneyFixtures, StringFixtures, TemporalFixtures};

/// Builder for subscription creation requests
pub struct SubscriptionRequestBuilder {
    customer_id: CustomerId,
    plan: String,
    base_amount: Money,
    trial_days: u32,
    coupon_pct: Rate,
    entitlement: String,
    auto_dunning: bool,
}

impl Default for SubscriptionRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRequestBuilder {
    pub fn new() -> Self {
        Self {
            customer_id: IdFixtures::customer_id(),
            plan: StringFixtures::plan().to_string(),
            base_amount: MoneyFixtures::usd_30(),
            trial_days: 0,
            coupon_pct: Rate::zero(),
            entitlement: StringFixtures::plan().to_string(),
            auto_dunning: true,
        }
    }

    pub fn with_customer_id(mut self, id: CustomerId) -> Self {
        self.customer_id = id;
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = plan.into();
        self
    }

    pub fn with_base_amount(mut self, amount: Money) -> Self {
        self.base_amount = amount;
        self
    }

    pub fn with_trial_days(mut self, days: u32) -> Self {
        self.trial_days = days;
        self
    }

    pub fn with_coupon(mut self, coupon: Rate) -> Self {
        self.coupon_pct = coupon;
        self
    }

    pub fn with_auto_dunning(mut self, enabled: bool) -> Self {
        self.auto_dunning = enabled;
        self
    }

    pub fn build(self) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            customer_id: self.customer_id,
            plan: self.plan,
            base_amount: self.base_amount,
            trial_days: self.trial_days,
            coupon_pct: self.coupon_pct,
            entitlement: self.entitlement,
            auto_dunning: self.auto_dunning,
        }
    }
}

/// Builder for open invoices
pub struct InvoiceBuilder {
    subscription_id: SubscriptionId,
    customer_id: CustomerId,
    amount: Money,
    period_start: DateTime<Utc>,
    period_length_days: u32,
    issued_at: DateTime<Utc>,
}

impl Default for InvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceBuilder {
    pub fn new() -> Self {
        Self {
            subscription_id: IdFixtures::subscription_id(),
            customer_id: IdFixtures::customer_id(),
            amount: MoneyFixtures::usd_30(),
            period_start: TemporalFixtures::anchor(),
            period_length_days: BillingPeriod::DEFAULT_LENGTH_DAYS,
            issued_at: TemporalFixtures::anchor(),
        }
    }

    pub fn with_subscription_id(mut self, id: SubscriptionId) -> Self {
        self.subscription_id = id;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_period_start(mut self, start: DateTime<Utc>) -> Self {
        self.period_start = start;
        self
    }

    pub fn with_period_length_days(mut self, days: u32) -> Self {
        self.period_length_days = days;
        self
    }

    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = at;
        self
    }

    /// Builds the invoice
    ///
    /// # Panics
    ///
    /// Panics on a zero period length; test data bugs should fail loudly.
    pub fn build(self) -> Invoice {
        let period = BillingPeriod::new(self.period_start, self.period_length_days)
            .expect("invalid billing period in test builder");
        Invoice::new(
            self.subscription_id,
            self.customer_id,
            self.amount,
            period,
            self.issued_at,
        )
    }
}

/// Builder for single payout requests
pub struct PayoutRequestBuilder {
    destination: String,
    amount: Money,
    verified: bool,
    approved: bool,
    scheduled_for: Option<DateTime<Utc>>,
}

impl Default for PayoutRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PayoutRequestBuilder {
    pub fn new() -> Self {
        Self {
            destination: StringFixtures::settlement_address().to_string(),
            amount: MoneyFixtures::usd_30(),
            verified: true,
            approved: true,
            scheduled_for: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn unverified(mut self) -> Self {
        self.verified = false;
        self
    }

    pub fn unapproved(mut self) -> Self {
        self.approved = false;
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn build(self) -> SinglePayoutRequest {
        SinglePayoutRequest {
            destination: self.destination,
            amount: self.amount,
            verified: self.verified,
            approved: self.approved,
            scheduled_for: self.scheduled_for,
        }
    }
}

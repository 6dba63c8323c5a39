//! Subscription aggregate and lifecycle state machine

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CustomerId, Money, Rate, SubscriptionId};

use crate::error::SubscriptionError;

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Inside the free-trial window
    Trialing,
    /// Billing normally
    Active,
    /// Collection failed at least once; dunning in progress
    PastDue,
    /// Terminal; no further billing or dunning
    Canceled,
}

impl SubscriptionStatus {
    /// Stable string form used in storage and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Whether this status accepts further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }

    /// Whether the subscription should be billed for new periods
    pub fn is_billable(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

/// Request to create a subscription
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub customer_id: CustomerId,
    pub plan: String,
    pub base_amount: Money,
    pub trial_days: u32,
    pub coupon_pct: Rate,
    pub entitlement: String,
    pub auto_dunning: bool,
}

/// A recurring subscription owned by a customer
///
/// The aggregate enforces the lifecycle state machine; stores enforce
/// optimistic versioning so concurrent dunning and portal actions on the
/// same subscription cannot interleave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier
    pub id: SubscriptionId,
    /// Owning customer
    pub customer_id: CustomerId,
    /// Plan identifier
    pub plan: String,
    /// Per-period billing amount before coupon/tax
    pub base_amount: Money,
    /// Tax rate resolved at creation time
    pub tax_rate: Rate,
    /// Coupon discount applied before tax
    pub coupon_pct: Rate,
    /// Free trial length in days
    pub trial_days: u32,
    /// Feature-access tier granted by the plan
    pub entitlement: String,
    /// Whether the dunning scheduler retries this subscription's invoices
    pub auto_dunning: bool,
    /// Lifecycle status
    pub status: SubscriptionStatus,
    /// When the subscription started
    pub start_date: DateTime<Utc>,
    /// Start of the most recently billed period
    pub last_bill_date: DateTime<Utc>,
    /// Optimistic concurrency version, bumped by the store on update
    pub version: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Creates a new subscription
    ///
    /// Initial status is `Trialing` when `trial_days > 0`, else `Active`.
    pub fn new(request: CreateSubscriptionRequest, tax_rate: Rate, now: DateTime<Utc>) -> Self {
        let status = if request.trial_days > 0 {
            SubscriptionStatus::Trialing
        } else {
            SubscriptionStatus::Active
        };

        Self {
            id: SubscriptionId::new_v7(),
            customer_id: request.customer_id,
            plan: request.plan,
            base_amount: request.base_amount,
            tax_rate,
            coupon_pct: request.coupon_pct,
            trial_days: request.trial_days,
            entitlement: request.entitlement,
            auto_dunning: request.auto_dunning,
            status,
            start_date: now,
            last_bill_date: now,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// When the free trial ends
    pub fn trial_end(&self) -> DateTime<Utc> {
        self.start_date + Duration::days(i64::from(self.trial_days))
    }

    /// Transitions to a new status, enforcing the state machine
    pub fn transition_to(&mut self, next: SubscriptionStatus) -> Result<(), SubscriptionError> {
        use SubscriptionStatus::*;

        let allowed = matches!(
            (self.status, next),
            (Trialing, Active)
                | (Trialing, Canceled)
                | (Active, PastDue)
                | (Active, Canceled)
                | (PastDue, Active)
                | (PastDue, Canceled)
        );

        if !allowed {
            return Err(SubscriptionError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Cancels the subscription; idempotent
    ///
    /// Returns true when the status actually changed, so callers emit the
    /// `sub_cancel` event exactly once.
    pub fn cancel(&mut self) -> bool {
        if self.status == SubscriptionStatus::Canceled {
            return false;
        }
        self.status = SubscriptionStatus::Canceled;
        self.updated_at = Utc::now();
        true
    }

    /// Changes plan and amount in place; the billing cycle is not reset
    pub fn upgrade(
        &mut self,
        new_plan: impl Into<String>,
        new_amount: Money,
    ) -> Result<(), SubscriptionError> {
        if self.status.is_terminal() {
            return Err(SubscriptionError::InvalidTransition {
                from: self.status.as_str(),
                to: "upgraded",
            });
        }
        if new_amount.is_negative() {
            return Err(SubscriptionError::Validation(
                "upgrade amount must not be negative".to_string(),
            ));
        }
        self.plan = new_plan.into();
        self.base_amount = new_amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Promotes an expired trial to Active; no-op while still in trial
    pub fn activate_if_trial_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == SubscriptionStatus::Trialing && now >= self.trial_end() {
            self.status = SubscriptionStatus::Active;
            self.updated_at = Utc::now();
            return true;
        }
        false
    }

    /// Base amount after the coupon discount, before tax
    pub fn discounted_base(&self) -> Money {
        self.coupon_pct.discount(&self.base_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn request(trial_days: u32) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            customer_id: CustomerId::new(),
            plan: "Premium".to_string(),
            base_amount: Money::new(dec!(10.0), Currency::USDC),
            trial_days,
            coupon_pct: Rate::zero(),
            entitlement: "Full AI + API".to_string(),
            auto_dunning: true,
        }
    }

    #[test]
    fn test_initial_status_from_trial_days() {
        let now = Utc::now();
        let with_trial = Subscription::new(request(7), Rate::zero(), now);
        assert_eq!(with_trial.status, SubscriptionStatus::Trialing);

        let no_trial = Subscription::new(request(0), Rate::zero(), now);
        assert_eq!(no_trial.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut sub = Subscription::new(request(0), Rate::zero(), Utc::now());
        assert!(sub.cancel());
        assert!(!sub.cancel());
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn test_canceled_is_terminal() {
        let mut sub = Subscription::new(request(0), Rate::zero(), Utc::now());
        sub.cancel();
        assert!(sub.transition_to(SubscriptionStatus::Active).is_err());
        assert!(sub.upgrade("Enterprise", Money::new(dec!(20.0), Currency::USDC)).is_err());
    }

    #[test]
    fn test_past_due_roundtrip() {
        let mut sub = Subscription::new(request(0), Rate::zero(), Utc::now());
        sub.transition_to(SubscriptionStatus::PastDue).unwrap();
        sub.transition_to(SubscriptionStatus::Active).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_upgrade_keeps_billing_cycle() {
        let mut sub = Subscription::new(request(0), Rate::zero(), Utc::now());
        let last_bill = sub.last_bill_date;
        sub.upgrade("Enterprise", Money::new(dec!(20.0), Currency::USDC)).unwrap();
        assert_eq!(sub.plan, "Enterprise");
        assert_eq!(sub.base_amount.amount(), dec!(20.0));
        assert_eq!(sub.last_bill_date, last_bill);
    }

    #[test]
    fn test_trial_promotion() {
        let now = Utc::now();
        let mut sub = Subscription::new(request(7), Rate::zero(), now);
        assert!(!sub.activate_if_trial_elapsed(now + Duration::days(3)));
        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert!(sub.activate_if_trial_elapsed(now + Duration::days(7)));
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_discounted_base() {
        let mut req = request(0);
        req.coupon_pct = Rate::from_percentage(dec!(20));
        let sub = Subscription::new(req, Rate::zero(), Utc::now());
        assert_eq!(sub.discounted_base().amount(), dec!(8.0));
    }
}

//! Portfolio reporting
//!
//! Point-in-time figures computed over the full subscription set. These
//! are pure functions; callers pass the current snapshot.

use rust_decimal::Decimal;

use core_kernel::{Currency, Money};
use domain_subscription::{Subscription, SubscriptionStatus};

use crate::error::RevenueError;

/// Monthly recurring revenue: the sum of active subscriptions' base
/// amounts, before coupon and tax
pub fn mrr(subscriptions: &[Subscription], currency: Currency) -> Result<Money, RevenueError> {
    let mut total = Money::zero(currency);
    for sub in subscriptions {
        if sub.status == SubscriptionStatus::Active {
            total = total.checked_add(&sub.base_amount)?;
        }
    }
    Ok(total)
}

/// Share of all subscriptions that have reached `Canceled`
///
/// Returns zero for an empty portfolio.
pub fn churn_rate(subscriptions: &[Subscription]) -> Decimal {
    if subscriptions.is_empty() {
        return Decimal::ZERO;
    }
    let canceled = subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Canceled)
        .count();
    Decimal::from(canceled) / Decimal::from(subscriptions.len())
}

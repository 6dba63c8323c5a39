//! Arithmetic invariants over the kernel types

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Money;
use test_utils::{
    billing_period_strategy, positive_money_strategy, rate_strategy, reporting_month_strategy,
    usd_money_strategy,
};

proptest! {
    #[test]
    fn prorate_full_window_returns_amount(money in positive_money_strategy(), total in 1i64..1000) {
        let prorated = money.prorate(total, total).unwrap();
        prop_assert_eq!(prorated, money);
    }

    #[test]
    fn prorate_zero_elapsed_is_zero(money in positive_money_strategy(), total in 1i64..1000) {
        prop_assert!(money.prorate(0, total).unwrap().is_zero());
    }

    #[test]
    fn prorate_never_exceeds_amount(
        money in usd_money_strategy(),
        elapsed in 0i64..1000,
        total in 1i64..1000,
    ) {
        let elapsed = elapsed.min(total);
        let prorated = money.prorate(elapsed, total).unwrap();
        prop_assert!(prorated.amount() <= money.amount());
    }

    #[test]
    fn recognized_plus_deferred_equals_amount(
        money in usd_money_strategy(),
        elapsed in 0i64..30,
    ) {
        // issuance split: prorated slice plus exact remainder
        let recognized = money.prorate(elapsed, 30).unwrap();
        let deferred = money.checked_sub(&recognized).unwrap();
        prop_assert_eq!(recognized.checked_add(&deferred).unwrap(), money);
    }

    #[test]
    fn discount_then_tax_never_negative(
        money in usd_money_strategy(),
        coupon in rate_strategy(),
        tax in rate_strategy(),
    ) {
        let taxable = coupon.discount(&money);
        let tax_amount = tax.apply(&taxable);
        prop_assert!(!taxable.is_negative());
        prop_assert!(!tax_amount.is_negative());
    }

    #[test]
    fn round_to_currency_is_idempotent(money in positive_money_strategy()) {
        let once = money.round_to_currency();
        prop_assert_eq!(once.round_to_currency(), once);
    }

    #[test]
    fn billing_period_contains_start_not_end(period in billing_period_strategy()) {
        prop_assert!(period.contains(period.start()));
        prop_assert!(!period.contains(period.end()));
    }

    #[test]
    fn billing_period_elapsed_plus_remaining_is_length(period in billing_period_strategy()) {
        let mid = period.start() + chrono::Duration::days(i64::from(period.length_days()) / 2);
        let total = period.days_elapsed(mid) + period.days_remaining(mid);
        prop_assert_eq!(total, i64::from(period.length_days()));
    }

    #[test]
    fn reporting_month_next_is_later(month in reporting_month_strategy()) {
        let next = month.next();
        prop_assert!(next.first_day() > month.first_day());
        prop_assert_eq!(next.first_day(), month.end_exclusive());
    }

    #[test]
    fn month_overlap_bounded_by_days_in_month(
        month in reporting_month_strategy(),
        period in billing_period_strategy(),
    ) {
        let overlap = month.overlap_days(period.start(), period.end());
        prop_assert!(overlap >= 0);
        prop_assert!(overlap <= month.days_in_month());
    }
}

#[test]
fn test_zero_money_round_trips_through_prorate() {
    let zero = Money::zero(core_kernel::Currency::USD);
    assert!(zero.prorate(10, 30).unwrap().is_zero());
    assert_eq!(zero.amount(), Decimal::ZERO);
}

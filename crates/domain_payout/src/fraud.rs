//! Fraud screening
//!
//! A robust single-point outlier test over the payout amount
//! distribution. The modified z-score uses median and median absolute
//! deviation, so one prior large payout cannot mask the next one the
//! way a mean/stddev score would.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Modified z-score screen over historical payout amounts
#[derive(Debug, Clone)]
pub struct FraudScreen {
    threshold: Decimal,
}

impl FraudScreen {
    /// Conventional cutoff for the modified z-score
    pub const DEFAULT_THRESHOLD: Decimal = dec!(3.5);

    pub fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }

    /// Screens one amount against a historical distribution
    ///
    /// Flags only when the score is strictly greater than the threshold;
    /// an amount exactly at the cutoff passes. Fewer than three samples,
    /// or a zero median absolute deviation, gives the screen nothing to
    /// measure against and the amount passes.
    pub fn is_anomalous(&self, amount: Decimal, history: &[Decimal]) -> bool {
        match self.score(amount, history) {
            Some(score) => score.abs() > self.threshold,
            None => false,
        }
    }

    /// The modified z-score, or `None` when the distribution is too
    /// small or degenerate to score
    pub fn score(&self, amount: Decimal, history: &[Decimal]) -> Option<Decimal> {
        if history.len() < 3 {
            return None;
        }
        let med = median(history);
        let deviations: Vec<Decimal> = history.iter().map(|x| (*x - med).abs()).collect();
        let mad = median(&deviations);
        if mad.is_zero() {
            return None;
        }
        Some(dec!(0.6745) * (amount - med) / mad)
    }
}

impl Default for FraudScreen {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

fn median(values: &[Decimal]) -> Decimal {
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / dec!(2)
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<Decimal> {
        vec![
            dec!(10),
            dec!(11),
            dec!(9),
            dec!(10.5),
            dec!(9.5),
            dec!(10),
        ]
    }

    #[test]
    fn test_typical_amount_passes() {
        let screen = FraudScreen::default();
        assert!(!screen.is_anomalous(dec!(10.2), &history()));
    }

    #[test]
    fn test_extreme_amount_flags() {
        let screen = FraudScreen::default();
        assert!(screen.is_anomalous(dec!(500), &history()));
    }

    #[test]
    fn test_short_history_passes_everything() {
        let screen = FraudScreen::default();
        assert!(!screen.is_anomalous(dec!(1000000), &[dec!(10), dec!(11)]));
    }

    #[test]
    fn test_zero_mad_passes() {
        let screen = FraudScreen::default();
        let flat = vec![dec!(10); 5];
        assert!(!screen.is_anomalous(dec!(1000000), &flat));
    }

    #[test]
    fn test_score_exactly_at_threshold_passes() {
        // Median 4, MAD 2; amount 14 scores exactly 0.6745 * 10 / 2
        let history = vec![dec!(0), dec!(2), dec!(4), dec!(6), dec!(8)];
        let screen = FraudScreen::new(dec!(3.3725));

        assert_eq!(screen.score(dec!(14), &history).unwrap(), dec!(3.3725));
        assert!(!screen.is_anomalous(dec!(14), &history));
        assert!(screen.is_anomalous(dec!(15), &history));
    }
}

//! Billing-period and reporting-month temporal types
//!
//! This module provides the date arithmetic the engine relies on:
//! - `BillingPeriod`: a fixed-length billing window (default 30 days) with
//!   elapsed/remaining day counts for proration
//! - `ReportingMonth`: a calendar month used to key amortization passes and
//!   revenue reports

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period length: {0} days")]
    InvalidLength(u32),

    #[error("Invalid month: {0}")]
    InvalidMonth(String),
}

/// A fixed-length billing window
///
/// Invoices are issued against a period; proration and revenue splits are
/// computed from the day counts within it. The period is half-open:
/// `[start, start + length_days)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    start: DateTime<Utc>,
    length_days: u32,
}

impl BillingPeriod {
    /// The default billing period length in days
    pub const DEFAULT_LENGTH_DAYS: u32 = 30;

    /// Creates a new billing period
    pub fn new(start: DateTime<Utc>, length_days: u32) -> Result<Self, TemporalError> {
        if length_days == 0 {
            return Err(TemporalError::InvalidLength(length_days));
        }
        Ok(Self { start, length_days })
    }

    /// The billing period an anchor date has rolled into by `now`
    ///
    /// Periods tile forward from the anchor in `length_days` increments;
    /// the returned period is the one containing `now` (or the first period
    /// when `now` precedes the anchor).
    pub fn current_for(
        anchor: DateTime<Utc>,
        now: DateTime<Utc>,
        length_days: u32,
    ) -> Result<Self, TemporalError> {
        if length_days == 0 {
            return Err(TemporalError::InvalidLength(length_days));
        }
        let elapsed = (now - anchor).num_days().max(0);
        let index = elapsed / i64::from(length_days);
        Ok(Self {
            start: anchor + Duration::days(index * i64::from(length_days)),
            length_days,
        })
    }

    /// Start of the period (inclusive)
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the period (exclusive); also the invoice due date
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::days(i64::from(self.length_days))
    }

    /// Period length in days
    pub fn length_days(&self) -> u32 {
        self.length_days
    }

    /// Whether `now` falls within the period
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.start && now < self.end()
    }

    /// Whole days elapsed since the period start, clamped to `[0, length]`
    pub fn days_elapsed(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start)
            .num_days()
            .clamp(0, i64::from(self.length_days))
    }

    /// Whole days remaining in the period, clamped to `[0, length]`
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        i64::from(self.length_days) - self.days_elapsed(now)
    }

    /// Whether the period starts after the first of its calendar month
    ///
    /// Mid-month starts trigger prorated revenue recognition.
    pub fn starts_mid_month(&self) -> bool {
        self.start.day() > 1
    }
}

/// A calendar month used to key amortization passes and revenue reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportingMonth {
    year: i32,
    month: u32,
}

impl ReportingMonth {
    /// Creates a reporting month; `month` is 1-based
    pub fn new(year: i32, month: u32) -> Result<Self, TemporalError> {
        if !(1..=12).contains(&month) {
            return Err(TemporalError::InvalidMonth(format!("{}-{}", year, month)));
        }
        Ok(Self { year, month })
    }

    /// The month containing the given instant
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("validated on construction")
    }

    /// First day of the following month (exclusive end of this month)
    pub fn end_exclusive(&self) -> NaiveDate {
        self.next().first_day()
    }

    /// The following month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Number of days in the month
    pub fn days_in_month(&self) -> i64 {
        (self.end_exclusive() - self.first_day()).num_days()
    }

    /// Day-count overlap between this month and the half-open window
    /// `[window_start, window_end)`
    pub fn overlap_days(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> i64 {
        let month_start = self.first_day();
        let month_end = self.end_exclusive();
        let start = window_start.date_naive().max(month_start);
        let end = window_end.date_naive().min(month_end);
        (end - start).num_days().max(0)
    }

    /// Whether the window ends within or before this month
    pub fn closes_window(&self, window_end: DateTime<Utc>) -> bool {
        window_end.date_naive() < self.end_exclusive()
    }
}

impl fmt::Display for ReportingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReportingMonth {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| TemporalError::InvalidMonth(s.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| TemporalError::InvalidMonth(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| TemporalError::InvalidMonth(s.to_string()))?;
        Self::new(year, month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_period_day_counts() {
        let period = BillingPeriod::new(utc(2024, 1, 1), 30).unwrap();
        assert_eq!(period.end(), utc(2024, 1, 31));
        assert_eq!(period.days_elapsed(utc(2024, 1, 16)), 15);
        assert_eq!(period.days_remaining(utc(2024, 1, 16)), 15);
        assert_eq!(period.days_elapsed(utc(2024, 3, 1)), 30);
        assert_eq!(period.days_elapsed(utc(2023, 12, 1)), 0);
    }

    #[test]
    fn test_current_period_tiles_forward() {
        let anchor = utc(2024, 1, 1);
        let p0 = BillingPeriod::current_for(anchor, utc(2024, 1, 15), 30).unwrap();
        assert_eq!(p0.start(), anchor);

        let p2 = BillingPeriod::current_for(anchor, utc(2024, 3, 5), 30).unwrap();
        assert_eq!(p2.start(), utc(2024, 3, 1));
        assert!(p2.contains(utc(2024, 3, 5)));
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(BillingPeriod::new(utc(2024, 1, 1), 0).is_err());
    }

    #[test]
    fn test_mid_month_start() {
        assert!(BillingPeriod::new(utc(2024, 1, 15), 30).unwrap().starts_mid_month());
        assert!(!BillingPeriod::new(utc(2024, 2, 1), 30).unwrap().starts_mid_month());
    }

    #[test]
    fn test_month_overlap() {
        let jan = ReportingMonth::new(2024, 1).unwrap();
        // Window spanning Jan 15 to Feb 14
        let start = utc(2024, 1, 15);
        let end = utc(2024, 2, 14);
        assert_eq!(jan.overlap_days(start, end), 17);
        let feb = jan.next();
        assert_eq!(feb.overlap_days(start, end), 13);
        assert_eq!(jan.overlap_days(start, end) + feb.overlap_days(start, end), 30);
        assert!(!jan.closes_window(end));
        assert!(feb.closes_window(end));
    }

    #[test]
    fn test_month_display_roundtrip() {
        let month = ReportingMonth::new(2024, 3).unwrap();
        assert_eq!(month.to_string(), "2024-03");
        let parsed: ReportingMonth = "2024-03".parse().unwrap();
        assert_eq!(parsed, month);
        assert_eq!(ReportingMonth::new(2024, 12).unwrap().next().to_string(), "2025-01");
    }
}

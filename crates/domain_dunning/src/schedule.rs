//! Dunning retry schedule

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DunningError;

/// Offsets from the invoice due date at which collection is attempted
///
/// The schedule length is the maximum attempt count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DunningSchedule {
    offsets_days: Vec<i64>,
}

impl DunningSchedule {
    /// Creates a schedule from day offsets; offsets must be strictly
    /// increasing and positive
    pub fn new(offsets_days: Vec<i64>) -> Result<Self, DunningError> {
        if offsets_days.is_empty() {
            return Err(DunningError::Validation(
                "dunning schedule must have at least one step".to_string(),
            ));
        }
        let increasing = offsets_days.windows(2).all(|w| w[0] < w[1]);
        if offsets_days[0] <= 0 || !increasing {
            return Err(DunningError::Validation(format!(
                "dunning offsets must be positive and strictly increasing: {offsets_days:?}"
            )));
        }
        Ok(Self { offsets_days })
    }

    /// Maximum number of attempts before exhaustion
    pub fn max_attempts(&self) -> u32 {
        self.offsets_days.len() as u32
    }

    /// When attempt `attempt_number` (1-based) becomes due, or `None`
    /// past the end of the schedule
    pub fn attempt_due_at(
        &self,
        due_date: DateTime<Utc>,
        attempt_number: u32,
    ) -> Option<DateTime<Utc>> {
        let offset = *self.offsets_days.get(attempt_number.checked_sub(1)? as usize)?;
        Some(due_date + Duration::days(offset))
    }

    /// Whether `previous_attempts` has consumed the whole schedule
    pub fn is_exhausted(&self, previous_attempts: u32) -> bool {
        previous_attempts >= self.max_attempts()
    }
}

impl Default for DunningSchedule {
    /// Attempts one, three, and seven days past due
    fn default() -> Self {
        Self {
            offsets_days: vec![1, 3, 7],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_schedule_offsets() {
        let schedule = DunningSchedule::default();
        let due = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();

        assert_eq!(schedule.max_attempts(), 3);
        assert_eq!(
            schedule.attempt_due_at(due, 1).unwrap(),
            due + Duration::days(1)
        );
        assert_eq!(
            schedule.attempt_due_at(due, 3).unwrap(),
            due + Duration::days(7)
        );
        assert!(schedule.attempt_due_at(due, 4).is_none());
        assert!(schedule.attempt_due_at(due, 0).is_none());
    }

    #[test]
    fn test_rejects_non_increasing_offsets() {
        assert!(DunningSchedule::new(vec![3, 1]).is_err());
        assert!(DunningSchedule::new(vec![0, 1]).is_err());
        assert!(DunningSchedule::new(vec![]).is_err());
    }
}

//! Optional daily usage budget.

use chrono::NaiveDate;

/// Locks once per day when today's total reaches the limit.
///
/// After the lock fires for a day, a manual unlock is respected until the date
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetPolicy {
    limit_seconds: i64,
    enforced_on: Option<NaiveDate>,
}

impl BudgetPolicy {
    pub fn from_minutes(limit_minutes: u64) -> Self {
        let limit_seconds = limit_minutes.saturating_mul(60);
        Self {
            limit_seconds: i64::try_from(limit_seconds).unwrap_or(i64::MAX),
            enforced_on: None,
        }
    }

    pub const fn limit_seconds(&self) -> i64 {
        self.limit_seconds
    }

    /// Seconds left today, never negative.
    pub fn remaining(&self, total_seconds: i64) -> i64 {
        (self.limit_seconds - total_seconds).max(0)
    }

    /// Returns `true` exactly once per day, on the first check at or over the limit.
    pub fn check(&mut self, total_seconds: i64, today: NaiveDate) -> bool {
        if total_seconds < self.limit_seconds || self.enforced_on == Some(today) {
            return false;
        }
        tracing::info!(total_seconds, limit = self.limit_seconds, %today, "daily budget used up");
        self.enforced_on = Some(today);
        true
    }
}

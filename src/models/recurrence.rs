/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Recurrence pattern model.
//!
//! A pattern describes how to compute a task's next occurrence date from
//! its current one. The stored pattern never changes as occurrences are
//! generated; only the computed dates clamp to the calendar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecurrenceError;

/// Kinds of recurrence.
///
/// `custom` behaves like `daily` with an arbitrary day interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
            RecurrenceKind::Yearly => "yearly",
            RecurrenceKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(RecurrenceKind::Daily),
            "weekly" => Some(RecurrenceKind::Weekly),
            "monthly" => Some(RecurrenceKind::Monthly),
            "yearly" => Some(RecurrenceKind::Yearly),
            "custom" => Some(RecurrenceKind::Custom),
            _ => None,
        }
    }
}

/// A recurrence pattern as stored in the database.
///
/// Examples:
/// - Every day: `kind=daily, interval=1`
/// - Every 2 weeks on Mon/Wed/Fri: `kind=weekly, interval=2, days_of_week=[0,2,4]`
/// - 15th of every month: `kind=monthly, interval=1, day_of_month=15`
/// - Every year on March 1st: `kind=yearly, interval=1, month_of_year=3, day_of_month=1`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub id: Uuid,
    pub user_id: String,
    pub kind: RecurrenceKind,
    /// Number of units (days/weeks/months/years) between occurrences, >= 1
    pub interval: i32,
    /// For weekly: which weekdays, 0=Monday .. 6=Sunday
    pub days_of_week: Option<Vec<u8>>,
    /// For monthly/yearly: target day, 1-31; computed dates clamp to the
    /// month's length
    pub day_of_month: Option<i32>,
    /// For yearly: target month, 1-12
    pub month_of_year: Option<i32>,
    /// Inclusive upper bound; no occurrence is generated past it
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrencePattern {
    /// Validates the pattern invariants.
    ///
    /// `interval >= 1`; weekly patterns need a non-empty days set with all
    /// days in 0..=6; day/month targets must be in calendar range.
    pub fn validate(&self) -> Result<(), RecurrenceError> {
        if self.interval < 1 {
            return Err(RecurrenceError::InvalidPattern(format!(
                "interval must be >= 1, got {}",
                self.interval
            )));
        }

        if self.kind == RecurrenceKind::Weekly {
            match &self.days_of_week {
                Some(days) if !days.is_empty() => {
                    if let Some(bad) = days.iter().find(|d| **d > 6) {
                        return Err(RecurrenceError::InvalidPattern(format!(
                            "day of week out of range: {}",
                            bad
                        )));
                    }
                }
                _ => {
                    return Err(RecurrenceError::InvalidPattern(
                        "weekly pattern requires a non-empty days_of_week set".to_string(),
                    ))
                }
            }
        }

        if let Some(day) = self.day_of_month {
            if !(1..=31).contains(&day) {
                return Err(RecurrenceError::InvalidPattern(format!(
                    "day_of_month out of range: {}",
                    day
                )));
            }
        }

        if let Some(month) = self.month_of_year {
            if !(1..=12).contains(&month) {
                return Err(RecurrenceError::InvalidPattern(format!(
                    "month_of_year out of range: {}",
                    month
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(kind: RecurrenceKind) -> RecurrencePattern {
        RecurrencePattern {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            kind,
            interval: 1,
            days_of_week: None,
            day_of_month: None,
            month_of_year: None,
            end_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn weekly_requires_days() {
        let mut p = pattern(RecurrenceKind::Weekly);
        assert!(p.validate().is_err());
        p.days_of_week = Some(vec![]);
        assert!(p.validate().is_err());
        p.days_of_week = Some(vec![0, 2]);
        assert!(p.validate().is_ok());
        p.days_of_week = Some(vec![7]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn interval_must_be_positive() {
        let mut p = pattern(RecurrenceKind::Daily);
        p.interval = 0;
        assert!(p.validate().is_err());
        p.interval = 1;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn calendar_ranges_checked() {
        let mut p = pattern(RecurrenceKind::Monthly);
        p.day_of_month = Some(32);
        assert!(p.validate().is_err());
        p.day_of_month = Some(31);
        assert!(p.validate().is_ok());

        let mut p = pattern(RecurrenceKind::Yearly);
        p.month_of_year = Some(13);
        assert!(p.validate().is_err());
        p.month_of_year = Some(12);
        assert!(p.validate().is_ok());
    }
}

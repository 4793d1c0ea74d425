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

//! Recurrence engine.
//!
//! [`next_occurrence`] is the pure calendar arithmetic: given a pattern and
//! the current occurrence's date, compute the next one. Dates that land on a
//! short month clamp to the month's last day, but the stored pattern is
//! never rewritten, so a "31st of every month" pattern recovers the 31st in
//! the next long month. The time of day always carries over unchanged.
//!
//! [`RecurrenceWorker`] is the event consumer that applies the arithmetic:
//! on every `task.completed` event for a recurring task, it creates the next
//! occurrence through the task service, which re-enters the normal reminder
//! scheduling path.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::dal::DAL;
use crate::error::RecurrenceError;
use crate::models::event::{EventType, TaskEvent};
use crate::models::recurrence::{RecurrenceKind, RecurrencePattern};
use crate::store::{NewTask, TaskService};

/// Computes the next occurrence after `from`, or `None` if the pattern's
/// end date has been reached.
pub fn next_occurrence(
    pattern: &RecurrencePattern,
    from: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
    pattern.validate()?;

    let next = match pattern.kind {
        RecurrenceKind::Daily | RecurrenceKind::Custom => {
            from + Duration::days(pattern.interval as i64)
        }
        RecurrenceKind::Weekly => next_weekly(pattern, from),
        RecurrenceKind::Monthly => add_months(from, pattern.interval, pattern.day_of_month)
            .ok_or_else(|| {
                RecurrenceError::InvalidPattern("monthly arithmetic out of range".to_string())
            })?,
        RecurrenceKind::Yearly => next_yearly(pattern, from).ok_or_else(|| {
            RecurrenceError::InvalidPattern("yearly arithmetic out of range".to_string())
        })?,
    };

    if let Some(end) = pattern.end_date {
        if next > end {
            return Ok(None);
        }
    }
    Ok(Some(next))
}

/// Weekly: the next configured weekday strictly after `from`'s weekday in
/// the same week, or the first configured weekday of the week `interval`
/// weeks out.
fn next_weekly(pattern: &RecurrencePattern, from: DateTime<Utc>) -> DateTime<Utc> {
    let mut days: Vec<u8> = pattern
        .days_of_week
        .clone()
        .unwrap_or_default();
    days.sort_unstable();
    days.dedup();

    // 0 = Monday .. 6 = Sunday
    let current = from.weekday().num_days_from_monday() as u8;

    if let Some(&next_day) = days.iter().find(|&&d| d > current) {
        return from + Duration::days((next_day - current) as i64);
    }

    // Wrap to the target week and take the earliest configured day.
    let days_until_monday = 7 - current as i64;
    let first_day = days[0] as i64;
    from + Duration::days(days_until_monday + 7 * (pattern.interval as i64 - 1) + first_day)
}

/// Adds calendar months, clamping the day to the destination month.
fn add_months(
    from: DateTime<Utc>,
    months: i32,
    target_day: Option<i32>,
) -> Option<DateTime<Utc>> {
    let total = from.year() * 12 + from.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;

    let desired = target_day.map(|d| d as u32).unwrap_or_else(|| from.day());
    let day = desired.min(days_in_month(year, month)?);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Utc.from_local_datetime(&date.and_time(from.time())).single()
}

/// Yearly: same date `interval` years later, with optional month/day
/// overrides. Feb 29 clamps to Feb 28 in non-leap years.
fn next_yearly(pattern: &RecurrencePattern, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let year = from.year() + pattern.interval;
    let month = pattern.month_of_year.map(|m| m as u32).unwrap_or_else(|| from.month());
    let desired = pattern
        .day_of_month
        .map(|d| d as u32)
        .unwrap_or_else(|| from.day());
    let day = desired.min(days_in_month(year, month)?);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Utc.from_local_datetime(&date.and_time(from.time())).single()
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next_first - first).num_days() as u32)
}

const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Renders a human-readable description of a pattern, e.g.
/// `"Every 2 weeks on Mon, Wed"`.
pub fn describe(pattern: &RecurrencePattern) -> String {
    let every = |unit: &str| {
        if pattern.interval == 1 {
            format!("Every {}", unit)
        } else {
            format!("Every {} {}s", pattern.interval, unit)
        }
    };

    match pattern.kind {
        RecurrenceKind::Daily | RecurrenceKind::Custom => every("day"),
        RecurrenceKind::Weekly => {
            let mut days: Vec<u8> = pattern.days_of_week.clone().unwrap_or_default();
            days.sort_unstable();
            days.dedup();
            let names: Vec<&str> = days
                .iter()
                .filter_map(|&d| WEEKDAY_NAMES.get(d as usize).copied())
                .collect();
            format!("{} on {}", every("week"), names.join(", "))
        }
        RecurrenceKind::Monthly => match pattern.day_of_month {
            Some(day) => format!("{} on day {}", every("month"), day),
            None => every("month"),
        },
        RecurrenceKind::Yearly => match (pattern.month_of_year, pattern.day_of_month) {
            // Rows can predate validation; an out-of-range month falls
            // back to the plain rendering instead of panicking.
            (Some(month), Some(day)) => match usize::try_from(month - 1)
                .ok()
                .and_then(|i| MONTH_NAMES.get(i))
            {
                Some(name) => format!("{} on {} {}", every("year"), name, day),
                None => every("year"),
            },
            _ => every("year"),
        },
    }
}

/// Creates the next occurrence of recurring tasks when they complete.
pub struct RecurrenceWorker {
    dal: DAL,
    bus: EventBus,
    tasks: Arc<dyn TaskService>,
}

impl RecurrenceWorker {
    pub fn new(dal: DAL, bus: EventBus, tasks: Arc<dyn TaskService>) -> Self {
        Self { dal, bus, tasks }
    }

    /// Runs the consume loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Recurrence worker started");
        let mut events_rx = self.bus.subscribe_task_events();

        loop {
            tokio::select! {
                received = events_rx.recv() => {
                    match received {
                        Ok(event) if event.event_type == EventType::TaskCompleted => {
                            if let Err(e) = self.process(&event).await {
                                error!("Failed to generate next occurrence: {}", e);
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Recurrence worker lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Event bus closed, recurrence worker stopping");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Recurrence worker shutting down");
                    break;
                }
            }
        }
    }

    /// Handles one `task.completed` event.
    ///
    /// Non-recurring tasks and tasks whose pattern has run out are a no-op.
    pub async fn process(&self, event: &TaskEvent) -> Result<(), RecurrenceError> {
        let task = match self.dal.task().get_by_id(event.entity_id).await? {
            Some(task) => task,
            None => {
                debug!(task_id = %event.entity_id, "Completed task already deleted");
                return Ok(());
            }
        };

        let pattern_id = match task.recurrence_id {
            Some(id) => id,
            None => return Ok(()),
        };

        let pattern = self
            .dal
            .recurrence()
            .get_by_id(pattern_id)
            .await?
            .ok_or(RecurrenceError::PatternNotFound(pattern_id))?;

        // Anchor on the task's own due date so completion time doesn't
        // drift the schedule; fall back to the event time for undated tasks.
        let anchor = task.due_at.unwrap_or(event.occurred_at);
        let next_due = match next_occurrence(&pattern, anchor)? {
            Some(next) => next,
            None => {
                debug!(task_id = %task.id, "Recurrence reached its end date");
                return Ok(());
            }
        };

        let next = self
            .tasks
            .create_task(NewTask {
                user_id: task.user_id.clone(),
                title: task.title.clone(),
                description: task.description.clone(),
                priority: task.priority,
                due_at: Some(next_due),
                reminder_offset_minutes: task.reminder_offset_minutes,
                recurrence_id: Some(pattern_id),
                parent_task_id: Some(task.parent_task_id.unwrap_or(task.id)),
            })
            .await
            .map_err(RecurrenceError::Storage)?;

        info!(
            completed_task = %task.id,
            next_task = %next.id,
            due_at = %next_due,
            "Created next occurrence"
        );
        Ok(())
    }
}

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

//! SQLite row types and domain conversions.
//!
//! SQLite has no native UUID, timestamp, or boolean types, so rows store
//! UUIDs as BLOB, timestamps as RFC3339 TEXT (which sorts correctly as a
//! string), and booleans as INTEGER. These types are the only place those
//! encodings appear; everything above the DAL works with domain types.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::{activity_log, recurrence_patterns, reminders, tasks};
use crate::error::StorageError;
use crate::models::recurrence::{RecurrenceKind, RecurrencePattern};
use crate::models::reminder::{Reminder, ReminderStatus};
use crate::models::task::{Priority, Task};

pub(crate) fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub(crate) fn blob_to_uuid(blob: &[u8]) -> Result<Uuid, StorageError> {
    Uuid::from_slice(blob)
        .map_err(|e| StorageError::CorruptRow(format!("invalid UUID blob: {}", e)))
}

pub(crate) fn datetime_to_string(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow(format!("invalid timestamp {:?}: {}", s, e)))
}

pub(crate) fn current_timestamp_string() -> String {
    datetime_to_string(Utc::now())
}

fn parse_days_of_week(s: &str) -> Result<Vec<u8>, StorageError> {
    serde_json::from_str(s)
        .map_err(|e| StorageError::CorruptRow(format!("invalid days_of_week {:?}: {}", s, e)))
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = tasks)]
pub struct TaskRow {
    pub id: Vec<u8>,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub completed: i32,
    pub due_at: Option<String>,
    pub reminder_offset_minutes: Option<i32>,
    pub recurrence_id: Option<Vec<u8>>,
    pub parent_task_id: Option<Vec<u8>>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    pub fn from_domain(task: &Task) -> Self {
        Self {
            id: uuid_to_blob(task.id),
            user_id: task.user_id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority.as_str().to_string(),
            completed: task.completed as i32,
            due_at: task.due_at.map(datetime_to_string),
            reminder_offset_minutes: task.reminder_offset_minutes,
            recurrence_id: task.recurrence_id.map(uuid_to_blob),
            parent_task_id: task.parent_task_id.map(uuid_to_blob),
            created_at: datetime_to_string(task.created_at),
            updated_at: datetime_to_string(task.updated_at),
        }
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = StorageError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: blob_to_uuid(&row.id)?,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            priority: Priority::parse(&row.priority).ok_or_else(|| {
                StorageError::CorruptRow(format!("unknown priority {:?}", row.priority))
            })?,
            completed: row.completed != 0,
            due_at: row.due_at.as_deref().map(string_to_datetime).transpose()?,
            reminder_offset_minutes: row.reminder_offset_minutes,
            recurrence_id: row.recurrence_id.as_deref().map(blob_to_uuid).transpose()?,
            parent_task_id: row
                .parent_task_id
                .as_deref()
                .map(blob_to_uuid)
                .transpose()?,
            created_at: string_to_datetime(&row.created_at)?,
            updated_at: string_to_datetime(&row.updated_at)?,
        })
    }
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = reminders)]
pub struct ReminderRow {
    pub id: Vec<u8>,
    pub task_id: Vec<u8>,
    pub user_id: String,
    pub scheduled_for: String,
    pub status: String,
    pub attempt: i32,
    pub delivery_channel: String,
    pub claimed_at: Option<String>,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ReminderRow {
    pub fn from_domain(reminder: &Reminder) -> Self {
        Self {
            id: uuid_to_blob(reminder.id),
            task_id: uuid_to_blob(reminder.task_id),
            user_id: reminder.user_id.clone(),
            scheduled_for: datetime_to_string(reminder.scheduled_for),
            status: reminder.status.as_str().to_string(),
            attempt: reminder.attempt,
            delivery_channel: reminder.delivery_channel.clone(),
            claimed_at: reminder.claimed_at.map(datetime_to_string),
            last_attempt_at: reminder.last_attempt_at.map(datetime_to_string),
            last_error: reminder.last_error.clone(),
            created_at: datetime_to_string(reminder.created_at),
            updated_at: datetime_to_string(reminder.updated_at),
        }
    }
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = StorageError;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        Ok(Reminder {
            id: blob_to_uuid(&row.id)?,
            task_id: blob_to_uuid(&row.task_id)?,
            user_id: row.user_id,
            scheduled_for: string_to_datetime(&row.scheduled_for)?,
            status: ReminderStatus::parse(&row.status).ok_or_else(|| {
                StorageError::CorruptRow(format!("unknown reminder status {:?}", row.status))
            })?,
            attempt: row.attempt,
            delivery_channel: row.delivery_channel,
            claimed_at: row
                .claimed_at
                .as_deref()
                .map(string_to_datetime)
                .transpose()?,
            last_attempt_at: row
                .last_attempt_at
                .as_deref()
                .map(string_to_datetime)
                .transpose()?,
            last_error: row.last_error,
            created_at: string_to_datetime(&row.created_at)?,
            updated_at: string_to_datetime(&row.updated_at)?,
        })
    }
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = recurrence_patterns)]
pub struct RecurrencePatternRow {
    pub id: Vec<u8>,
    pub user_id: String,
    pub kind: String,
    pub recur_interval: i32,
    pub days_of_week: Option<String>,
    pub day_of_month: Option<i32>,
    pub month_of_year: Option<i32>,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl RecurrencePatternRow {
    pub fn from_domain(pattern: &RecurrencePattern) -> Self {
        Self {
            id: uuid_to_blob(pattern.id),
            user_id: pattern.user_id.clone(),
            kind: pattern.kind.as_str().to_string(),
            recur_interval: pattern.interval,
            days_of_week: pattern
                .days_of_week
                .as_ref()
                .map(|days| serde_json::to_string(days).expect("Vec<u8> serializes to JSON")),
            day_of_month: pattern.day_of_month,
            month_of_year: pattern.month_of_year,
            end_date: pattern.end_date.map(datetime_to_string),
            created_at: datetime_to_string(pattern.created_at),
            updated_at: datetime_to_string(pattern.updated_at),
        }
    }
}

impl TryFrom<RecurrencePatternRow> for RecurrencePattern {
    type Error = StorageError;

    fn try_from(row: RecurrencePatternRow) -> Result<Self, Self::Error> {
        Ok(RecurrencePattern {
            id: blob_to_uuid(&row.id)?,
            user_id: row.user_id,
            kind: RecurrenceKind::parse(&row.kind).ok_or_else(|| {
                StorageError::CorruptRow(format!("unknown recurrence kind {:?}", row.kind))
            })?,
            interval: row.recur_interval,
            days_of_week: row
                .days_of_week
                .as_deref()
                .map(parse_days_of_week)
                .transpose()?,
            day_of_month: row.day_of_month,
            month_of_year: row.month_of_year,
            end_date: row.end_date.as_deref().map(string_to_datetime).transpose()?,
            created_at: string_to_datetime(&row.created_at)?,
            updated_at: string_to_datetime(&row.updated_at)?,
        })
    }
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = activity_log)]
pub struct ActivityLogRow {
    pub id: Vec<u8>,
    pub user_id: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Vec<u8>,
    pub occurred_at: String,
    pub details: Option<String>,
    pub created_at: String,
}

impl ActivityLogRow {
    pub fn from_domain(entry: &crate::models::activity_log::ActivityLogEntry) -> Self {
        Self {
            id: uuid_to_blob(entry.id),
            user_id: entry.user_id.clone(),
            event_type: entry.event_type.clone(),
            entity_type: entry.entity_type.clone(),
            entity_id: uuid_to_blob(entry.entity_id),
            occurred_at: datetime_to_string(entry.occurred_at),
            details: if entry.details.is_null() {
                None
            } else {
                Some(entry.details.to_string())
            },
            created_at: datetime_to_string(entry.created_at),
        }
    }
}

impl TryFrom<ActivityLogRow> for crate::models::activity_log::ActivityLogEntry {
    type Error = StorageError;

    fn try_from(row: ActivityLogRow) -> Result<Self, Self::Error> {
        let details = match row.details {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                StorageError::CorruptRow(format!("invalid details JSON: {}", e))
            })?,
            None => serde_json::Value::Null,
        };
        Ok(Self {
            id: blob_to_uuid(&row.id)?,
            user_id: row.user_id,
            event_type: row.event_type,
            entity_type: row.entity_type,
            entity_id: blob_to_uuid(&row.entity_id)?,
            occurred_at: string_to_datetime(&row.occurred_at)?,
            details,
            created_at: string_to_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_blob_round_trip() {
        let id = Uuid::new_v4();
        assert_eq!(blob_to_uuid(&uuid_to_blob(id)).unwrap(), id);
        assert!(blob_to_uuid(&[1, 2, 3]).is_err());
    }

    #[test]
    fn timestamp_strings_sort_chronologically() {
        let earlier = datetime_to_string(Utc::now());
        let later = datetime_to_string(Utc::now() + chrono::Duration::seconds(5));
        assert!(earlier < later);
    }

    #[test]
    fn timestamp_round_trip() {
        let now = Utc::now();
        let parsed = string_to_datetime(&datetime_to_string(now)).unwrap();
        // RFC3339 with microsecond precision loses sub-microsecond digits
        assert!((parsed - now).num_microseconds().unwrap().abs() < 1);
        assert!(string_to_datetime("not a timestamp").is_err());
    }

    #[test]
    fn reminder_row_round_trip() {
        let reminder = Reminder {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            user_id: "user-1".into(),
            scheduled_for: Utc::now(),
            status: ReminderStatus::Retrying,
            attempt: 2,
            delivery_channel: "in-app".into(),
            claimed_at: None,
            last_attempt_at: Some(Utc::now()),
            last_error: Some("timed out".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let row = ReminderRow::from_domain(&reminder);
        let back = Reminder::try_from(row).unwrap();
        assert_eq!(back.id, reminder.id);
        assert_eq!(back.status, ReminderStatus::Retrying);
        assert_eq!(back.attempt, 2);
        assert_eq!(back.last_error.as_deref(), Some("timed out"));
    }
}

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

//! Task model.
//!
//! Tasks are owned by the task store; the scheduling subsystem reads the
//! due/recurrence fields and creates completion-triggered occurrences back
//! through [`crate::store::TaskService`]. Nothing here mutates a task row
//! outside that interface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// A task as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user identifier
    pub user_id: String,
    /// Task title
    pub title: String,
    /// Longer free-form description
    pub description: String,
    /// Priority level
    pub priority: Priority,
    /// Completion flag
    pub completed: bool,
    /// When the task is due, if set
    pub due_at: Option<DateTime<Utc>>,
    /// How many minutes before `due_at` the reminder should fire
    pub reminder_offset_minutes: Option<i32>,
    /// Recurrence pattern reference, if the task repeats
    pub recurrence_id: Option<Uuid>,
    /// For generated occurrences, the first task in the chain
    pub parent_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Whether the task should have a reminder scheduled.
    pub fn wants_reminder(&self) -> bool {
        self.due_at.is_some() && self.reminder_offset_minutes.is_some()
    }

    /// The instant the reminder should fire, if the task wants one.
    pub fn reminder_time(&self) -> Option<DateTime<Utc>> {
        let due = self.due_at?;
        let offset = self.reminder_offset_minutes?;
        Some(due - chrono::Duration::minutes(offset as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task_with(due_at: Option<DateTime<Utc>>, offset: Option<i32>) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            title: "t".into(),
            description: String::new(),
            priority: Priority::default(),
            completed: false,
            due_at,
            reminder_offset_minutes: offset,
            recurrence_id: None,
            parent_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn reminder_time_subtracts_offset() {
        let due = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let task = task_with(Some(due), Some(30));
        assert_eq!(
            task.reminder_time().unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 1, 11, 30, 0).unwrap()
        );
    }

    #[test]
    fn no_reminder_without_due_date_or_offset() {
        assert!(!task_with(None, Some(30)).wants_reminder());
        assert!(!task_with(Some(Utc::now()), None).wants_reminder());
        assert!(task_with(Some(Utc::now()), Some(0)).wants_reminder());
    }
}

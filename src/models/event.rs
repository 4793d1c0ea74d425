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

//! Event envelope and payload types carried on the bus.
//!
//! Every event names the entity it concerns and the user who owns it, so
//! consumers can fan out or persist without re-reading the database. The
//! payload is schemaless JSON; producers put the fields their consumers
//! need and nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::reminder::ReminderStatus;

/// The kinds of events the subsystem emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "reminder.due")]
    ReminderDue,
    #[serde(rename = "reminder.sent")]
    ReminderSent,
    #[serde(rename = "reminder.failed")]
    ReminderFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TaskCreated => "task.created",
            EventType::TaskUpdated => "task.updated",
            EventType::TaskCompleted => "task.completed",
            EventType::TaskDeleted => "task.deleted",
            EventType::ReminderDue => "reminder.due",
            EventType::ReminderSent => "reminder.sent",
            EventType::ReminderFailed => "reminder.failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task.created" => Some(EventType::TaskCreated),
            "task.updated" => Some(EventType::TaskUpdated),
            "task.completed" => Some(EventType::TaskCompleted),
            "task.deleted" => Some(EventType::TaskDeleted),
            "reminder.due" => Some(EventType::ReminderDue),
            "reminder.sent" => Some(EventType::ReminderSent),
            "reminder.failed" => Some(EventType::ReminderFailed),
            _ => None,
        }
    }
}

/// Envelope for task lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Unique per emission, for consumer-side deduplication
    pub event_id: Uuid,
    pub event_type: EventType,
    /// Entity kind, e.g. `"task"`
    pub entity_type: String,
    pub entity_id: Uuid,
    pub user_id: String,
    /// Event-specific fields as schemaless JSON
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl TaskEvent {
    /// Builds an envelope for a task, stamping a fresh event id and the
    /// current time.
    pub fn for_task(
        event_type: EventType,
        task_id: Uuid,
        user_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            entity_type: "task".to_string(),
            entity_id: task_id,
            user_id: user_id.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// A reminder that crossed its scheduled time and was claimed for delivery.
///
/// Carries enough task context to render the notification without another
/// database read on the consumer side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderDue {
    pub reminder_id: Uuid,
    pub task_id: Uuid,
    pub user_id: String,
    pub task_title: String,
    pub task_due_at: Option<DateTime<Utc>>,
    /// The attempt number this delivery corresponds to (1-based)
    pub attempt: i32,
}

/// The terminal or intermediate result of a delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderOutcome {
    pub reminder_id: Uuid,
    pub task_id: Uuid,
    pub user_id: String,
    pub status: ReminderStatus,
    pub attempt: i32,
    pub error: Option<String>,
}

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

//! Reminder model and status state machine.
//!
//! Lifecycle: `pending -> due -> (sent | retrying -> due -> ... |
//! dead_lettered) | cancelled`. The `due` state marks a reminder claimed by
//! a scanner instance; `retrying` marks one waiting out its backoff before
//! re-entering the due-detection path. `sent`, `dead_lettered`, and
//! `cancelled` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Waiting for its scheduled time
    Pending,
    /// Claimed by the scanner; a delivery attempt is in flight
    Due,
    /// A delivery attempt failed; waiting out the backoff
    Retrying,
    /// Delivered successfully (terminal)
    Sent,
    /// Exhausted the retry budget (terminal)
    DeadLettered,
    /// Task completed or deleted before the reminder fired (terminal)
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Due => "due",
            ReminderStatus::Retrying => "retrying",
            ReminderStatus::Sent => "sent",
            ReminderStatus::DeadLettered => "dead_lettered",
            ReminderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReminderStatus::Pending),
            "due" => Some(ReminderStatus::Due),
            "retrying" => Some(ReminderStatus::Retrying),
            "sent" => Some(ReminderStatus::Sent),
            "dead_lettered" => Some(ReminderStatus::DeadLettered),
            "cancelled" => Some(ReminderStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReminderStatus::Sent | ReminderStatus::DeadLettered | ReminderStatus::Cancelled
        )
    }
}

/// A reminder as stored in the database.
///
/// The attempt counter lives on the row, not in memory, so the retry budget
/// survives process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: String,
    /// When the reminder becomes eligible for delivery. For reminders in
    /// `retrying` this is the end of the current backoff window.
    pub scheduled_for: DateTime<Utc>,
    pub status: ReminderStatus,
    /// Number of delivery attempts made so far
    pub attempt: i32,
    /// How the reminder is delivered (`in-app` by default)
    pub delivery_channel: String,
    /// When the scanner claimed the reminder, for stale-claim recovery
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            ReminderStatus::Pending,
            ReminderStatus::Due,
            ReminderStatus::Retrying,
            ReminderStatus::Sent,
            ReminderStatus::DeadLettered,
            ReminderStatus::Cancelled,
        ] {
            assert_eq!(ReminderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReminderStatus::parse("nope"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(ReminderStatus::Sent.is_terminal());
        assert!(ReminderStatus::DeadLettered.is_terminal());
        assert!(ReminderStatus::Cancelled.is_terminal());
        assert!(!ReminderStatus::Pending.is_terminal());
        assert!(!ReminderStatus::Due.is_terminal());
        assert!(!ReminderStatus::Retrying.is_terminal());
    }
}

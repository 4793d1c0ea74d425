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

//! Activity log entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row in the per-user activity history.
///
/// Entries are append-only and written by the activity logger as it
/// consumes events off the bus; the log is an audit trail, not a source
/// of truth for entity state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub user_id: String,
    /// Topic-style event name, e.g. `"task.completed"`
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    /// When the event happened, as stamped by the producer
    pub occurred_at: DateTime<Utc>,
    /// The event payload as it arrived
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

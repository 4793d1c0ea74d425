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

//! Messages pushed to a user's live connections.
//!
//! A [`SyncMessage`] is the wire shape the fanout hands to every registered
//! connection for the owning user. Sync messages mirror entity changes so
//! other devices converge; notification messages surface reminder outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of push this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Entity state changed; clients update their local copy
    Sync,
    /// Something the user should see, e.g. a delivered reminder
    Notification,
}

/// The change that triggered a sync message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// A message bound for every live connection of one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub kind: MessageKind,
    pub entity_type: String,
    pub operation: Operation,
    pub entity_id: Uuid,
    /// Entity fields or notification content, schemaless
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SyncMessage {
    pub fn sync(
        entity_type: impl Into<String>,
        operation: Operation,
        entity_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: MessageKind::Sync,
            entity_type: entity_type.into(),
            operation,
            entity_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn notification(
        entity_type: impl Into<String>,
        entity_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: MessageKind::Notification,
            entity_type: entity_type.into(),
            operation: Operation::Update,
            entity_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_lowercase() {
        let msg = SyncMessage::sync(
            "task",
            Operation::Create,
            Uuid::new_v4(),
            serde_json::json!({"title": "t"}),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "sync");
        assert_eq!(value["operation"], "create");
        assert_eq!(value["entity_type"], "task");
    }
}

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

//! Sync fanout.
//!
//! Translates bus events into [`SyncMessage`]s and pushes them to every
//! live connection of the owning user, so all of a user's devices converge
//! on the same state. Events for users with no live connections are
//! dropped; clients reconcile on reconnect by re-fetching.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::models::event::{EventType, ReminderOutcome, TaskEvent};
use crate::models::sync::{Operation, SyncMessage};
use crate::sync::registry::ConnectionRegistry;

/// Pushes task and reminder state changes to the owning user's connections.
pub struct SyncFanout {
    bus: EventBus,
    registry: Arc<ConnectionRegistry>,
}

impl SyncFanout {
    pub fn new(bus: EventBus, registry: Arc<ConnectionRegistry>) -> Self {
        Self { bus, registry }
    }

    /// Runs the fanout loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Sync fanout started");
        let mut events_rx = self.bus.subscribe_task_events();
        let mut outcomes_rx = self.bus.subscribe_reminder_outcomes();

        loop {
            tokio::select! {
                received = events_rx.recv() => {
                    match received {
                        Ok(event) => self.fan_out_task_event(&event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Sync fanout lagged behind task events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("Task event channel closed, sync fanout stopping");
                            break;
                        }
                    }
                }
                received = outcomes_rx.recv() => {
                    match received {
                        Ok(outcome) => self.fan_out_outcome(&outcome).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Sync fanout lagged behind reminder outcomes");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("Reminder outcome channel closed, sync fanout stopping");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Sync fanout shutting down");
                    break;
                }
            }
        }
    }

    /// Mirrors one task lifecycle event to the user's connections.
    pub async fn fan_out_task_event(&self, event: &TaskEvent) {
        let operation = match event.event_type {
            EventType::TaskCreated => Operation::Create,
            EventType::TaskUpdated | EventType::TaskCompleted => Operation::Update,
            EventType::TaskDeleted => Operation::Delete,
            // Reminder events travel on their own topics.
            _ => return,
        };

        let message = SyncMessage::sync(
            event.entity_type.clone(),
            operation,
            event.entity_id,
            event.payload.clone(),
        );
        self.registry.broadcast(&event.user_id, &message).await;
    }

    /// Mirrors one delivery outcome so clients can show reminder state.
    pub async fn fan_out_outcome(&self, outcome: &ReminderOutcome) {
        let message = SyncMessage::sync(
            "reminder",
            Operation::Update,
            outcome.reminder_id,
            serde_json::json!({
                "task_id": outcome.task_id,
                "status": outcome.status.as_str(),
                "attempt": outcome.attempt,
                "error": outcome.error,
            }),
        );
        self.registry.broadcast(&outcome.user_id, &message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sync::MessageKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn task_events_become_sync_messages_for_the_owner_only() {
        let bus = EventBus::new();
        let registry = Arc::new(ConnectionRegistry::new(8));
        let fanout = SyncFanout::new(bus, registry.clone());

        let (_owner, mut owner_rx) = registry.register("user-1").await;
        let (_other, mut other_rx) = registry.register("user-2").await;

        let task_id = Uuid::new_v4();
        fanout
            .fan_out_task_event(&TaskEvent::for_task(
                EventType::TaskCreated,
                task_id,
                "user-1",
                serde_json::json!({"title": "t"}),
            ))
            .await;

        let message = owner_rx.try_recv().unwrap();
        assert_eq!(message.kind, MessageKind::Sync);
        assert_eq!(message.operation, Operation::Create);
        assert_eq!(message.entity_id, task_id);
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn deleted_tasks_map_to_delete_operations() {
        let bus = EventBus::new();
        let registry = Arc::new(ConnectionRegistry::new(8));
        let fanout = SyncFanout::new(bus, registry.clone());
        let (_h, mut rx) = registry.register("user-1").await;

        fanout
            .fan_out_task_event(&TaskEvent::for_task(
                EventType::TaskDeleted,
                Uuid::new_v4(),
                "user-1",
                serde_json::json!({}),
            ))
            .await;

        assert_eq!(rx.try_recv().unwrap().operation, Operation::Delete);
    }

    #[tokio::test]
    async fn outcomes_carry_reminder_status() {
        use crate::models::reminder::ReminderStatus;

        let bus = EventBus::new();
        let registry = Arc::new(ConnectionRegistry::new(8));
        let fanout = SyncFanout::new(bus, registry.clone());
        let (_h, mut rx) = registry.register("user-1").await;

        fanout
            .fan_out_outcome(&ReminderOutcome {
                reminder_id: Uuid::new_v4(),
                task_id: Uuid::new_v4(),
                user_id: "user-1".into(),
                status: ReminderStatus::DeadLettered,
                attempt: 3,
                error: Some("timed out".into()),
            })
            .await;

        let message = rx.try_recv().unwrap();
        assert_eq!(message.entity_type, "reminder");
        assert_eq!(message.payload["status"], "dead_lettered");
        assert_eq!(message.payload["attempt"], 3);
    }
}

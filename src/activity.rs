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

//! Activity logger.
//!
//! Consumes every task lifecycle event and reminder outcome and appends an
//! immutable audit record per event. Persistence failures are logged and
//! the event dropped; the audit trail is best-effort and must never stall
//! the pipeline that feeds it.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::dal::DAL;
use crate::error::StorageError;
use crate::models::activity_log::ActivityLogEntry;
use crate::models::event::{ReminderOutcome, TaskEvent};
use crate::models::reminder::ReminderStatus;

/// Persists bus events as activity history.
pub struct ActivityLogger {
    dal: DAL,
    bus: EventBus,
}

impl ActivityLogger {
    pub fn new(dal: DAL, bus: EventBus) -> Self {
        Self { dal, bus }
    }

    /// Runs the logging loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Activity logger started");
        let mut events_rx = self.bus.subscribe_task_events();
        let mut outcomes_rx = self.bus.subscribe_reminder_outcomes();

        loop {
            tokio::select! {
                received = events_rx.recv() => {
                    match received {
                        Ok(event) => {
                            if let Err(e) = self.log_task_event(&event).await {
                                error!("Failed to persist activity entry: {}", e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Activity logger lagged behind task events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Event bus closed, activity logger stopping");
                            break;
                        }
                    }
                }
                received = outcomes_rx.recv() => {
                    match received {
                        Ok(outcome) => {
                            if let Err(e) = self.log_outcome(&outcome).await {
                                error!("Failed to persist activity entry: {}", e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Activity logger lagged behind reminder outcomes");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Event bus closed, activity logger stopping");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Activity logger shutting down");
                    break;
                }
            }
        }
    }

    /// Appends one entry for a task lifecycle event.
    pub async fn log_task_event(&self, event: &TaskEvent) -> Result<(), StorageError> {
        let now = Utc::now();
        self.dal
            .activity_log()
            .append(&ActivityLogEntry {
                id: Uuid::new_v4(),
                user_id: event.user_id.clone(),
                event_type: event.event_type.as_str().to_string(),
                entity_type: event.entity_type.clone(),
                entity_id: event.entity_id,
                occurred_at: event.occurred_at,
                details: event.payload.clone(),
                created_at: now,
            })
            .await
    }

    /// Appends one entry for a reminder outcome.
    pub async fn log_outcome(&self, outcome: &ReminderOutcome) -> Result<(), StorageError> {
        let event_type = match outcome.status {
            ReminderStatus::Sent => "reminder.sent",
            _ => "reminder.failed",
        };
        let now = Utc::now();
        self.dal
            .activity_log()
            .append(&ActivityLogEntry {
                id: Uuid::new_v4(),
                user_id: outcome.user_id.clone(),
                event_type: event_type.to_string(),
                entity_type: "reminder".to_string(),
                entity_id: outcome.reminder_id,
                occurred_at: now,
                details: serde_json::json!({
                    "task_id": outcome.task_id,
                    "status": outcome.status.as_str(),
                    "attempt": outcome.attempt,
                    "error": outcome.error,
                }),
                created_at: now,
            })
            .await
    }
}

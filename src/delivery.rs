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

//! Reminder delivery.
//!
//! The delivery consumer reads claimed reminders off the bus and pushes
//! them through a [`NotificationChannel`]. Every attempt is wrapped in a
//! timeout. Failures are classified: transient errors re-enter the backoff
//! cycle until the retry budget runs out, permanent errors dead-letter
//! immediately. Exactly one `reminder.failed` outcome is published per
//! dead-lettered reminder, and one `reminder.sent` per delivered one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::dal::DAL;
use crate::error::{DeliveryError, SchedulerError};
use crate::models::event::{ReminderDue, ReminderOutcome};
use crate::models::reminder::ReminderStatus;
use crate::models::sync::SyncMessage;
use crate::retry::RetryPolicy;
use crate::sync::registry::ConnectionRegistry;

/// A transport that can surface a due reminder to the user.
///
/// Implementations classify their failures through [`DeliveryError`]; the
/// consumer decides retry versus dead-letter from that classification, not
/// from the channel itself.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// A short name for logging, e.g. `"in-app"`.
    fn name(&self) -> &str;

    /// Attempts to deliver one reminder notification.
    async fn deliver(&self, due: &ReminderDue) -> Result<(), DeliveryError>;
}

/// Delivers reminders as push messages to the user's live connections.
///
/// Delivery to a user with no live connections succeeds vacuously; in-app
/// notifications are best-effort by nature and the reminder row still
/// records that it fired.
pub struct InAppChannel {
    registry: Arc<ConnectionRegistry>,
}

impl InAppChannel {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl NotificationChannel for InAppChannel {
    fn name(&self) -> &str {
        "in-app"
    }

    async fn deliver(&self, due: &ReminderDue) -> Result<(), DeliveryError> {
        let message = SyncMessage::notification(
            "reminder",
            due.reminder_id,
            serde_json::json!({
                "task_id": due.task_id,
                "title": due.task_title,
                "due_at": due.task_due_at,
            }),
        );

        let delivered = self.registry.broadcast(&due.user_id, &message).await;
        debug!(
            user_id = %due.user_id,
            connections = delivered,
            "Pushed reminder notification"
        );
        Ok(())
    }
}

/// Consumes `reminder.due` events and applies the delivery state machine.
pub struct DeliveryConsumer {
    dal: DAL,
    bus: EventBus,
    channel: Arc<dyn NotificationChannel>,
    retry_policy: RetryPolicy,
    attempt_timeout: std::time::Duration,
}

impl DeliveryConsumer {
    pub fn new(
        dal: DAL,
        bus: EventBus,
        channel: Arc<dyn NotificationChannel>,
        retry_policy: RetryPolicy,
        attempt_timeout: std::time::Duration,
    ) -> Self {
        Self {
            dal,
            bus,
            channel,
            retry_policy,
            attempt_timeout,
        }
    }

    /// Runs the consume loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(channel = self.channel.name(), "Delivery consumer started");
        let mut due_rx = self.bus.subscribe_reminder_due();

        loop {
            tokio::select! {
                received = due_rx.recv() => {
                    match received {
                        Ok(due) => {
                            if let Err(e) = self.process(due).await {
                                error!("Failed to process due reminder: {}", e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // The skipped reminders stay claimed and come
                            // back through stale-claim recovery.
                            warn!(skipped, "Delivery consumer lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Event bus closed, delivery consumer stopping");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Delivery consumer shutting down");
                    break;
                }
            }
        }
    }

    /// Processes one due reminder end to end.
    ///
    /// Re-reads the row first: only a reminder still in `due` is acted on,
    /// so a cancellation or a competing consumer racing this event makes it
    /// a no-op.
    pub async fn process(&self, due: ReminderDue) -> Result<(), SchedulerError> {
        let reminder = match self.dal.reminder().get_by_id(due.reminder_id).await? {
            Some(reminder) if reminder.status == ReminderStatus::Due => reminder,
            Some(reminder) => {
                debug!(
                    reminder_id = %due.reminder_id,
                    status = reminder.status.as_str(),
                    "Reminder no longer claimed, skipping delivery"
                );
                return Ok(());
            }
            None => {
                debug!(reminder_id = %due.reminder_id, "Reminder row gone, skipping delivery");
                return Ok(());
            }
        };

        let result = match tokio::time::timeout(self.attempt_timeout, self.channel.deliver(&due))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        };

        match result {
            Ok(()) => {
                if self.dal.reminder().mark_sent(reminder.id).await? {
                    info!(
                        reminder_id = %reminder.id,
                        attempt = reminder.attempt,
                        "Reminder delivered"
                    );
                    self.bus.publish_reminder_outcome(ReminderOutcome {
                        reminder_id: reminder.id,
                        task_id: reminder.task_id,
                        user_id: reminder.user_id,
                        status: ReminderStatus::Sent,
                        attempt: reminder.attempt,
                        error: None,
                    });
                }
                Ok(())
            }
            Err(e) => self.handle_failure(&due, reminder.attempt, e).await,
        }
    }

    async fn handle_failure(
        &self,
        due: &ReminderDue,
        attempt: i32,
        error: DeliveryError,
    ) -> Result<(), SchedulerError> {
        let retry = error.is_transient() && !self.retry_policy.is_exhausted(attempt);

        if retry {
            let delay = self.retry_policy.calculate_delay(attempt);
            let retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            warn!(
                reminder_id = %due.reminder_id,
                attempt,
                retry_in_secs = delay.as_secs(),
                "Reminder delivery failed, will retry: {}",
                error
            );
            self.dal
                .reminder()
                .record_failure(due.reminder_id, &error.to_string(), Some(retry_at))
                .await?;
        } else {
            error!(
                reminder_id = %due.reminder_id,
                attempt,
                transient = error.is_transient(),
                "Reminder dead-lettered: {}",
                error
            );
            let moved = self
                .dal
                .reminder()
                .record_failure(due.reminder_id, &error.to_string(), None)
                .await?;
            if moved {
                self.bus.publish_reminder_outcome(ReminderOutcome {
                    reminder_id: due.reminder_id,
                    task_id: due.task_id,
                    user_id: due.user_id.clone(),
                    status: ReminderStatus::DeadLettered,
                    attempt,
                    error: Some(error.to_string()),
                });
            }
        }

        Ok(())
    }
}

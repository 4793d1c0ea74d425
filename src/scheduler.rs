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

//! Reminder scheduler.
//!
//! The scheduler ticks on a fixed interval and runs one scan per tick. A
//! scan recovers stale claims, claims the batch of reminders whose scheduled
//! time has passed, drops reminders whose task disappeared or completed, and
//! publishes a `reminder.due` event for the rest. All coordination happens
//! through the conditional updates in [`crate::dal::ReminderDAL`], so any
//! number of scheduler instances can run against the same database without
//! double-delivering.

use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::dal::DAL;
use crate::error::SchedulerError;
use crate::models::event::{ReminderDue, ReminderOutcome};
use crate::models::reminder::{Reminder, ReminderStatus};
use crate::retry::RetryPolicy;

/// Periodically scans for due reminders and hands them to delivery.
pub struct ReminderScheduler {
    dal: DAL,
    bus: EventBus,
    retry_policy: RetryPolicy,
    tick_interval: std::time::Duration,
    batch_size: i64,
    /// How long a claim may sit before it is presumed abandoned
    stale_claim_grace: Duration,
}

impl ReminderScheduler {
    pub fn new(
        dal: DAL,
        bus: EventBus,
        retry_policy: RetryPolicy,
        tick_interval: std::time::Duration,
        batch_size: i64,
        stale_claim_grace: Duration,
    ) -> Self {
        Self {
            dal,
            bus,
            retry_policy,
            tick_interval,
            batch_size,
            stale_claim_grace,
        }
    }

    /// Runs the scan loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.tick_interval.as_secs(),
            "Reminder scheduler started"
        );
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.scan_once().await {
                        error!("Reminder scan failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Reminder scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Performs one scan: stale-claim recovery, then claim-and-publish.
    pub async fn scan_once(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();

        self.recover_stale_claims().await?;

        let claimed = self.dal.reminder().claim_due(now, self.batch_size).await?;
        if claimed.is_empty() {
            return Ok(());
        }
        debug!(count = claimed.len(), "Claimed due reminders");

        for reminder in claimed {
            if let Err(e) = self.dispatch(reminder).await {
                error!("Failed to dispatch claimed reminder: {}", e);
            }
        }

        Ok(())
    }

    /// Publishes one claimed reminder, or cancels it if its task is gone or
    /// already completed.
    async fn dispatch(&self, reminder: Reminder) -> Result<(), SchedulerError> {
        let task = self.dal.task().get_by_id(reminder.task_id).await?;

        let task = match task {
            Some(task) if !task.completed => task,
            Some(_) => {
                debug!(reminder_id = %reminder.id, "Task completed before reminder fired, cancelling");
                self.dal.reminder().cancel(reminder.id).await?;
                return Ok(());
            }
            None => {
                debug!(reminder_id = %reminder.id, "Task deleted before reminder fired, cancelling");
                self.dal.reminder().cancel(reminder.id).await?;
                return Ok(());
            }
        };

        self.bus.publish_reminder_due(ReminderDue {
            reminder_id: reminder.id,
            task_id: task.id,
            user_id: reminder.user_id.clone(),
            task_title: task.title.clone(),
            task_due_at: task.due_at,
            attempt: reminder.attempt,
        });

        Ok(())
    }

    /// Routes reminders with abandoned claims back through the retry policy.
    ///
    /// A claim older than the grace period means the delivery consumer died
    /// mid-attempt. The attempt was already counted at claim time, so each
    /// stale row is treated exactly like a failed delivery: back to
    /// `retrying` if budget remains, dead-lettered otherwise.
    async fn recover_stale_claims(&self) -> Result<(), SchedulerError> {
        let cutoff = Utc::now() - self.stale_claim_grace;
        let stale = self.dal.reminder().list_stale(cutoff).await?;

        for reminder in stale {
            warn!(
                reminder_id = %reminder.id,
                attempt = reminder.attempt,
                "Recovering stale reminder claim"
            );

            if self.retry_policy.is_exhausted(reminder.attempt) {
                let moved = self
                    .dal
                    .reminder()
                    .record_failure(reminder.id, "delivery attempt abandoned", None)
                    .await?;
                if moved {
                    self.bus.publish_reminder_outcome(ReminderOutcome {
                        reminder_id: reminder.id,
                        task_id: reminder.task_id,
                        user_id: reminder.user_id.clone(),
                        status: ReminderStatus::DeadLettered,
                        attempt: reminder.attempt,
                        error: Some("delivery attempt abandoned".to_string()),
                    });
                }
            } else {
                // Same backoff as any other failed attempt, so a crashed
                // consumer doesn't trigger an instant redelivery burst.
                let delay = self.retry_policy.calculate_delay(reminder.attempt);
                let retry_at =
                    Utc::now() + Duration::from_std(delay).unwrap_or_else(|_| Duration::zero());
                self.dal
                    .reminder()
                    .record_failure(reminder.id, "delivery attempt abandoned", Some(retry_at))
                    .await?;
            }
        }

        Ok(())
    }
}

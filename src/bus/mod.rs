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

//! In-process event bus.
//!
//! One broadcast channel per topic, typed end to end. Publishing is
//! fire-and-forget: a topic with no live subscribers drops the event rather
//! than failing the producer, so the task store never blocks or errors on
//! downstream consumers. Each subscriber gets its own receiver and its own
//! cursor; a slow subscriber lags and skips, it never backpressures the
//! producer.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::event::{ReminderDue, ReminderOutcome, TaskEvent};

/// Default per-topic channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// The in-process event bus connecting producers to background services.
///
/// Cloning is cheap; clones share the same underlying channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    task_events: broadcast::Sender<TaskEvent>,
    reminder_due: broadcast::Sender<ReminderDue>,
    reminder_outcomes: broadcast::Sender<ReminderOutcome>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (task_events, _) = broadcast::channel(capacity);
        let (reminder_due, _) = broadcast::channel(capacity);
        let (reminder_outcomes, _) = broadcast::channel(capacity);
        Self {
            task_events,
            reminder_due,
            reminder_outcomes,
        }
    }

    /// Publishes a task lifecycle event.
    pub fn publish_task_event(&self, event: TaskEvent) {
        debug!(
            event_type = event.event_type.as_str(),
            entity_id = %event.entity_id,
            "Publishing task event"
        );
        // A send error means no subscribers, which is fine.
        let _ = self.task_events.send(event);
    }

    /// Publishes a claimed reminder for delivery.
    pub fn publish_reminder_due(&self, due: ReminderDue) {
        debug!(reminder_id = %due.reminder_id, attempt = due.attempt, "Publishing due reminder");
        let _ = self.reminder_due.send(due);
    }

    /// Publishes the outcome of a delivery attempt.
    pub fn publish_reminder_outcome(&self, outcome: ReminderOutcome) {
        debug!(
            reminder_id = %outcome.reminder_id,
            status = outcome.status.as_str(),
            "Publishing reminder outcome"
        );
        let _ = self.reminder_outcomes.send(outcome);
    }

    pub fn subscribe_task_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.task_events.subscribe()
    }

    pub fn subscribe_reminder_due(&self) -> broadcast::Receiver<ReminderDue> {
        self.reminder_due.subscribe()
    }

    pub fn subscribe_reminder_outcomes(&self) -> broadcast::Receiver<ReminderOutcome> {
        self.reminder_outcomes.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience producer for task lifecycle events.
///
/// Owns a bus handle and stamps the envelope fields so call sites only name
/// the event type and payload.
#[derive(Clone, Debug)]
pub struct TaskEventProducer {
    bus: EventBus,
}

impl TaskEventProducer {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Emits a task lifecycle event.
    pub fn emit(
        &self,
        event_type: crate::models::event::EventType,
        task_id: uuid::Uuid,
        user_id: &str,
        payload: serde_json::Value,
    ) {
        self.bus.publish_task_event(TaskEvent::for_task(
            event_type, task_id, user_id, payload,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventType;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscribers_each_see_every_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe_task_events();
        let mut second = bus.subscribe_task_events();

        bus.publish_task_event(TaskEvent::for_task(
            EventType::TaskCreated,
            Uuid::new_v4(),
            "user-1",
            serde_json::json!({}),
        ));

        assert_eq!(
            first.recv().await.unwrap().event_type,
            EventType::TaskCreated
        );
        assert_eq!(
            second.recv().await.unwrap().event_type,
            EventType::TaskCreated
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        // Must not panic or error.
        bus.publish_reminder_due(ReminderDue {
            reminder_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            user_id: "user-1".into(),
            task_title: "t".into(),
            task_due_at: None,
            attempt: 1,
        });
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish_task_event(TaskEvent::for_task(
            EventType::TaskDeleted,
            Uuid::new_v4(),
            "user-1",
            serde_json::json!({}),
        ));

        let mut late = bus.subscribe_task_events();
        bus.publish_task_event(TaskEvent::for_task(
            EventType::TaskCreated,
            Uuid::new_v4(),
            "user-1",
            serde_json::json!({}),
        ));

        assert_eq!(
            late.recv().await.unwrap().event_type,
            EventType::TaskCreated
        );
    }
}

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

//! Task store.
//!
//! [`TaskStore`] is the write path for tasks: it commits the row, reconciles
//! the task's reminder (schedule, move, or cancel), and then publishes the
//! lifecycle event. The row commit is the source of truth; event publishing
//! is fire-and-forget and never fails a committed write.
//!
//! [`TaskService`] is the trait seam consumers depend on; the recurrence
//! worker creates next occurrences through it so generated tasks get
//! reminders and events exactly like user-created ones.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::TaskEventProducer;
use crate::dal::DAL;
use crate::error::StorageError;
use crate::models::event::EventType;
use crate::models::reminder::{Reminder, ReminderStatus};
use crate::models::task::{Priority, Task};

/// Fields for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_at: Option<chrono::DateTime<Utc>>,
    pub reminder_offset_minutes: Option<i32>,
    pub recurrence_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
}

/// The task write interface.
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StorageError>;
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StorageError>;
    async fn update_task(&self, task: Task) -> Result<Task, StorageError>;
    async fn mark_completed(&self, id: Uuid) -> Result<Task, StorageError>;
    async fn delete_task(&self, id: Uuid) -> Result<(), StorageError>;
}

/// The database-backed task service.
#[derive(Clone)]
pub struct TaskStore {
    dal: DAL,
    producer: TaskEventProducer,
    default_channel: String,
}

impl TaskStore {
    pub fn new(dal: DAL, producer: TaskEventProducer, default_channel: impl Into<String>) -> Self {
        Self {
            dal,
            producer,
            default_channel: default_channel.into(),
        }
    }

    /// Brings the task's reminder in line with its current due/offset
    /// fields.
    ///
    /// A reminder whose fire time is already in the past is not scheduled;
    /// the task simply shows as due. A pending reminder is moved in place;
    /// one already claimed or retrying belongs to the old schedule and is
    /// cancelled in favor of a fresh pending row, so a task never has more
    /// than one live reminder.
    async fn reconcile_reminder(&self, task: &Task) -> Result<(), StorageError> {
        let fire_at = match task.reminder_time() {
            Some(fire_at) if !task.completed => fire_at,
            _ => {
                self.dal.reminder().cancel_for_task(task.id).await?;
                return Ok(());
            }
        };

        let now = Utc::now();
        if fire_at <= now {
            debug!(task_id = %task.id, "Reminder time already passed, not scheduling");
            self.dal.reminder().cancel_for_task(task.id).await?;
            return Ok(());
        }

        if self
            .dal
            .reminder()
            .reschedule_pending(task.id, fire_at)
            .await?
        {
            return Ok(());
        }

        // No pending row to move. Any reminder mid-claim or mid-retry
        // belongs to the old schedule; retire it so the task keeps a
        // single live reminder.
        self.dal.reminder().cancel_for_task(task.id).await?;

        let reminder = Reminder {
            id: Uuid::new_v4(),
            task_id: task.id,
            user_id: task.user_id.clone(),
            scheduled_for: fire_at,
            status: ReminderStatus::Pending,
            attempt: 0,
            delivery_channel: self.default_channel.clone(),
            claimed_at: None,
            last_attempt_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.dal.reminder().create(&reminder).await?;
        debug!(task_id = %task.id, reminder_id = %reminder.id, fire_at = %fire_at, "Reminder scheduled");
        Ok(())
    }

    fn task_payload(task: &Task) -> serde_json::Value {
        serde_json::json!({
            "title": task.title,
            "priority": task.priority.as_str(),
            "completed": task.completed,
            "due_at": task.due_at,
        })
    }
}

#[async_trait]
impl TaskService for TaskStore {
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StorageError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: new_task.user_id,
            title: new_task.title,
            description: new_task.description,
            priority: new_task.priority,
            completed: false,
            due_at: new_task.due_at,
            reminder_offset_minutes: new_task.reminder_offset_minutes,
            recurrence_id: new_task.recurrence_id,
            parent_task_id: new_task.parent_task_id,
            created_at: now,
            updated_at: now,
        };

        self.dal.task().create(&task).await?;
        self.reconcile_reminder(&task).await?;

        info!(task_id = %task.id, user_id = %task.user_id, "Task created");
        self.producer.emit(
            EventType::TaskCreated,
            task.id,
            &task.user_id,
            Self::task_payload(&task),
        );
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StorageError> {
        self.dal.task().get_by_id(id).await
    }

    async fn update_task(&self, task: Task) -> Result<Task, StorageError> {
        // Ensures the row exists before emitting an update event for it.
        self.dal.task().require(task.id).await?;
        self.dal.task().update(&task).await?;
        self.reconcile_reminder(&task).await?;

        let task = self.dal.task().require(task.id).await?;
        self.producer.emit(
            EventType::TaskUpdated,
            task.id,
            &task.user_id,
            Self::task_payload(&task),
        );
        Ok(task)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<Task, StorageError> {
        let task = self.dal.task().mark_completed(id).await?;
        let cancelled = self.dal.reminder().cancel_for_task(id).await?;
        if cancelled > 0 {
            debug!(task_id = %id, cancelled, "Cancelled reminders for completed task");
        }

        info!(task_id = %id, "Task completed");
        self.producer.emit(
            EventType::TaskCompleted,
            task.id,
            &task.user_id,
            Self::task_payload(&task),
        );
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), StorageError> {
        let task = self.dal.task().require(id).await?;
        // Cancel first so an in-flight claim observes the terminal state
        // even though the rows cascade away with the task.
        self.dal.reminder().cancel_for_task(id).await?;
        self.dal.task().delete(id).await?;

        info!(task_id = %id, "Task deleted");
        self.producer.emit(
            EventType::TaskDeleted,
            id,
            &task.user_id,
            serde_json::json!({ "title": task.title }),
        );
        Ok(())
    }
}

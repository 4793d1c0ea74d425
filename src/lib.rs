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

//! # Tocsin
//!
//! Tocsin is the event-driven reminder and recurrence engine for a task
//! management application. It decides when a reminder becomes due, delivers
//! it with bounded retries and a dead-letter terminal state, computes the
//! next occurrence of recurring tasks on completion, and fans task lifecycle
//! events out to every live client connection of the owning user.
//!
//! The crate is organized around independent background services that react
//! to a timer or to events on an in-process bus:
//!
//! - [`scheduler::ReminderScheduler`] - ticks on a fixed interval, claims
//!   due reminders with a conditional update, and publishes `reminder.due`
//!   events.
//! - [`delivery::DeliveryConsumer`] - consumes `reminder.due`, attempts
//!   delivery through a [`delivery::NotificationChannel`], and applies a
//!   retry-with-backoff policy terminating in `sent` or `dead_lettered`.
//! - [`recurrence::RecurrenceWorker`] - consumes `task.completed` events and
//!   creates the next occurrence of recurring tasks.
//! - [`sync::SyncFanout`] - pushes a translated message to every live
//!   connection registered for the event's owning user.
//! - [`activity::ActivityLogger`] - persists every lifecycle event as an
//!   immutable audit record.
//!
//! All services are owned by a [`runtime::Runtime`], which opens the
//! database, runs migrations, and coordinates graceful shutdown.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tocsin::runtime::Runtime;
//! use tocsin::store::NewTask;
//!
//! let runtime = Runtime::new("tasks.db").await?;
//! let tasks = runtime.task_service();
//!
//! let task = tasks.create_task(NewTask {
//!     user_id: "user-1".into(),
//!     title: "File quarterly report".into(),
//!     due_at: Some(due),
//!     reminder_offset_minutes: Some(30),
//!     ..Default::default()
//! }).await?;
//!
//! // ... later
//! runtime.shutdown().await?;
//! ```

pub mod activity;
pub mod bus;
pub mod dal;
pub mod database;
pub mod delivery;
pub mod error;
pub mod models;
pub mod recurrence;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod sync;

pub use bus::{EventBus, TaskEventProducer};
pub use database::Database;
pub use error::{
    DeliveryError, RecurrenceError, RuntimeError, SchedulerError, StorageError,
};
pub use models::event::{EventType, ReminderDue, ReminderOutcome, TaskEvent};
pub use models::recurrence::{RecurrenceKind, RecurrencePattern};
pub use models::reminder::{Reminder, ReminderStatus};
pub use models::task::Task;
pub use retry::RetryPolicy;
pub use runtime::{Runtime, RuntimeConfig};
pub use store::{NewTask, TaskService, TaskStore};
pub use sync::registry::{ConnectionHandle, ConnectionRegistry};

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

//! Error types for the reminder and recurrence subsystem.
//!
//! Errors are split by concern so that each background service owns its own
//! failure taxonomy. The delivery path additionally classifies errors as
//! transient (retried with backoff) or permanent (dead-lettered without
//! retry); see [`DeliveryError::is_transient`].

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the data access layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to obtain or use a pooled connection
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A row referenced by id does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// A stored value could not be converted back to its domain type
    #[error("Corrupt row data: {0}")]
    CorruptRow(String),
}

/// Errors raised by a notification channel during a delivery attempt.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The delivery attempt exceeded its timeout
    #[error("Delivery attempt timed out")]
    Timeout,

    /// The channel is temporarily unreachable
    #[error("Notification channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// The channel rejected the message; retrying will not help
    #[error("Notification rejected: {0}")]
    Rejected(String),

    /// The reminder references a task that no longer exists
    #[error("Task {0} no longer exists")]
    TaskGone(Uuid),
}

impl DeliveryError {
    /// Whether the error is worth retrying.
    ///
    /// Timeouts and unreachable channels are transient; rejections and
    /// dangling task references are permanent and go straight to the
    /// dead-letter state.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Timeout => true,
            DeliveryError::ChannelUnavailable(_) => true,
            DeliveryError::Rejected(_) => false,
            DeliveryError::TaskGone(_) => false,
        }
    }
}

/// Errors raised by the reminder scheduler's scan-and-claim loop and the
/// delivery consumer.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by the recurrence engine.
#[derive(Error, Debug)]
pub enum RecurrenceError {
    /// The pattern referenced by a task does not exist
    #[error("Recurrence pattern not found: {0}")]
    PatternNotFound(Uuid),

    /// The pattern violates an invariant (e.g. weekly with no days)
    #[error("Invalid recurrence pattern: {0}")]
    InvalidPattern(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Top-level errors raised by the runtime while wiring or running services.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Database connection failed: {message}")]
    DatabaseConnection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(DeliveryError::Timeout.is_transient());
        assert!(DeliveryError::ChannelUnavailable("down".into()).is_transient());
        assert!(!DeliveryError::Rejected("bad payload".into()).is_transient());
        assert!(!DeliveryError::TaskGone(Uuid::new_v4()).is_transient());
    }
}

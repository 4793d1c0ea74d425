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

//! Data Access Layer for the reminder and recurrence subsystem.
//!
//! The DAL wraps the connection pool and exposes one accessor per entity.
//! All methods run their diesel queries inside `conn.interact()` closures so
//! the blocking SQLite work stays off the async executor threads.
//!
//! # Example
//!
//! ```rust,ignore
//! let dal = DAL::new(database);
//! let reminder = dal.reminder().get_by_id(reminder_id).await?;
//! ```

mod activity_log;
mod models;
mod recurrence;
mod reminder;
mod task;

pub use activity_log::ActivityLogDAL;
pub use recurrence::RecurrenceDAL;
pub use reminder::ReminderDAL;
pub use task::TaskDAL;

use crate::database::Database;

/// Entry point for all database operations.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Access to task records.
    pub fn task(&self) -> TaskDAL {
        TaskDAL { dal: self }
    }

    /// Access to reminder records and the claim state machine.
    pub fn reminder(&self) -> ReminderDAL {
        ReminderDAL { dal: self }
    }

    /// Access to recurrence patterns.
    pub fn recurrence(&self) -> RecurrenceDAL {
        RecurrenceDAL { dal: self }
    }

    /// Access to the append-only activity log.
    pub fn activity_log(&self) -> ActivityLogDAL {
        ActivityLogDAL { dal: self }
    }
}

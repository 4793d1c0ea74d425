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

//! Task data access operations.

use diesel::prelude::*;
use uuid::Uuid;

use super::models::{current_timestamp_string, uuid_to_blob, TaskRow};
use super::DAL;
use crate::database::schema::tasks;
use crate::error::StorageError;
use crate::models::task::Task;

/// Data access for task records.
pub struct TaskDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> TaskDAL<'a> {
    /// Inserts a new task row.
    pub async fn create(&self, task: &Task) -> Result<(), StorageError> {
        let row = TaskRow::from_domain(task);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(tasks::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Fetches a task by id, or `None` if it no longer exists.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Task>, StorageError> {
        let id_blob = uuid_to_blob(id);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let row = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::id.eq(id_blob))
                    .first::<TaskRow>(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        row.map(Task::try_from).transpose()
    }

    /// Fetches a task by id, failing if it does not exist.
    pub async fn require(&self, id: Uuid) -> Result<Task, StorageError> {
        self.get_by_id(id)
            .await?
            .ok_or(StorageError::NotFound { entity: "task", id })
    }

    /// Rewrites every mutable column of a task row.
    pub async fn update(&self, task: &Task) -> Result<(), StorageError> {
        let id_blob = uuid_to_blob(task.id);
        let row = TaskRow::from_domain(task);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let updated = conn
            .interact(move |conn| {
                diesel::update(tasks::table.filter(tasks::id.eq(id_blob)))
                    .set((
                        tasks::title.eq(row.title),
                        tasks::description.eq(row.description),
                        tasks::priority.eq(row.priority),
                        tasks::completed.eq(row.completed),
                        tasks::due_at.eq(row.due_at),
                        tasks::reminder_offset_minutes.eq(row.reminder_offset_minutes),
                        tasks::recurrence_id.eq(row.recurrence_id),
                        tasks::updated_at.eq(current_timestamp_string()),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if updated == 0 {
            return Err(StorageError::NotFound {
                entity: "task",
                id: task.id,
            });
        }
        Ok(())
    }

    /// Marks a task completed. Returns the updated task.
    pub async fn mark_completed(&self, id: Uuid) -> Result<Task, StorageError> {
        let id_blob = uuid_to_blob(id);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let updated = conn
            .interact(move |conn| {
                diesel::update(tasks::table.filter(tasks::id.eq(id_blob)))
                    .set((
                        tasks::completed.eq(1),
                        tasks::updated_at.eq(current_timestamp_string()),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if updated == 0 {
            return Err(StorageError::NotFound { entity: "task", id });
        }
        // Return the connection to the single-slot pool before `require`
        // acquires its own; holding it across the call deadlocks.
        drop(conn);
        self.require(id).await
    }

    /// Deletes a task row. Reminder rows cascade at the database level.
    pub async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        let id_blob = uuid_to_blob(id);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let deleted = conn
            .interact(move |conn| {
                diesel::delete(tasks::table.filter(tasks::id.eq(id_blob))).execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if deleted == 0 {
            return Err(StorageError::NotFound { entity: "task", id });
        }
        Ok(())
    }

    /// Lists a user's tasks, newest first.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Task>, StorageError> {
        let user_id = user_id.to_string();
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let rows = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::user_id.eq(user_id))
                    .order(tasks::created_at.desc())
                    .load::<TaskRow>(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(Task::try_from).collect()
    }
}

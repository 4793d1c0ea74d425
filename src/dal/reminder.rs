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

//! Reminder data access operations.
//!
//! The status column is the coordination point for the whole delivery
//! pipeline: every transition is a conditional UPDATE that names the state
//! it expects to leave, and the affected-row count tells the caller whether
//! it won. A scanner that loses the race simply skips the row. Stored
//! timestamps are RFC3339 TEXT in a fixed format, so string comparison in
//! SQL is chronological comparison.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::models::{current_timestamp_string, datetime_to_string, uuid_to_blob, ReminderRow};
use super::DAL;
use crate::database::schema::reminders;
use crate::error::StorageError;
use crate::models::reminder::{Reminder, ReminderStatus};

/// Data access for reminder records.
pub struct ReminderDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> ReminderDAL<'a> {
    /// Inserts a new reminder row.
    pub async fn create(&self, reminder: &Reminder) -> Result<(), StorageError> {
        let row = ReminderRow::from_domain(reminder);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(reminders::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Fetches a reminder by id.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Reminder>, StorageError> {
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
                reminders::table
                    .filter(reminders::id.eq(id_blob))
                    .first::<ReminderRow>(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        row.map(Reminder::try_from).transpose()
    }

    /// Moves a task's pending reminder to a new time.
    ///
    /// Returns `true` if a pending reminder existed and was moved. Reminders
    /// past the pending state are left alone; the caller creates a fresh one
    /// if the task still wants a reminder.
    pub async fn reschedule_pending(
        &self,
        task_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let task_blob = uuid_to_blob(task_id);
        let when = datetime_to_string(scheduled_for);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    reminders::table
                        .filter(reminders::task_id.eq(task_blob))
                        .filter(reminders::status.eq(ReminderStatus::Pending.as_str())),
                )
                .set((
                    reminders::scheduled_for.eq(when),
                    reminders::updated_at.eq(current_timestamp_string()),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated > 0)
    }

    /// Cancels every non-terminal reminder for a task.
    ///
    /// Returns the number of reminders cancelled.
    pub async fn cancel_for_task(&self, task_id: Uuid) -> Result<usize, StorageError> {
        let task_blob = uuid_to_blob(task_id);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let cancelled = conn
            .interact(move |conn| {
                diesel::update(
                    reminders::table
                        .filter(reminders::task_id.eq(task_blob))
                        .filter(reminders::status.eq_any(vec![
                            ReminderStatus::Pending.as_str(),
                            ReminderStatus::Due.as_str(),
                            ReminderStatus::Retrying.as_str(),
                        ])),
                )
                .set((
                    reminders::status.eq(ReminderStatus::Cancelled.as_str()),
                    reminders::claimed_at.eq(None::<String>),
                    reminders::updated_at.eq(current_timestamp_string()),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(cancelled)
    }

    /// Cancels a single reminder if it has not already reached a terminal
    /// state. Returns `true` if this call performed the cancellation.
    pub async fn cancel(&self, id: Uuid) -> Result<bool, StorageError> {
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
                diesel::update(
                    reminders::table
                        .filter(reminders::id.eq(id_blob))
                        .filter(reminders::status.eq_any(vec![
                            ReminderStatus::Pending.as_str(),
                            ReminderStatus::Due.as_str(),
                            ReminderStatus::Retrying.as_str(),
                        ])),
                )
                .set((
                    reminders::status.eq(ReminderStatus::Cancelled.as_str()),
                    reminders::claimed_at.eq(None::<String>),
                    reminders::updated_at.eq(current_timestamp_string()),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    /// Claims up to `batch_size` reminders whose scheduled time has passed.
    ///
    /// Each claim is a conditional update from the row's observed status
    /// (`pending` or `retrying`) to `due`, stamping `claimed_at` and
    /// incrementing the attempt counter. Rows another scanner claimed first
    /// are skipped. Returns the claimed reminders with their new state.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<Vec<Reminder>, StorageError> {
        let now_string = datetime_to_string(now);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let claimed_rows = conn
            .interact(move |conn| {
                conn.transaction::<Vec<ReminderRow>, diesel::result::Error, _>(|conn| {
                    let candidates = reminders::table
                        .filter(reminders::status.eq_any(vec![
                            ReminderStatus::Pending.as_str(),
                            ReminderStatus::Retrying.as_str(),
                        ]))
                        .filter(reminders::scheduled_for.le(&now_string))
                        .order(reminders::scheduled_for.asc())
                        .limit(batch_size)
                        .load::<ReminderRow>(conn)?;

                    let mut claimed = Vec::with_capacity(candidates.len());
                    for row in candidates {
                        let won = diesel::update(
                            reminders::table
                                .filter(reminders::id.eq(&row.id))
                                .filter(reminders::status.eq(&row.status)),
                        )
                        .set((
                            reminders::status.eq(ReminderStatus::Due.as_str()),
                            reminders::claimed_at.eq(Some(now_string.clone())),
                            reminders::attempt.eq(row.attempt + 1),
                            reminders::last_attempt_at.eq(Some(now_string.clone())),
                            reminders::updated_at.eq(now_string.clone()),
                        ))
                        .execute(conn)?;

                        if won == 1 {
                            claimed.push(ReminderRow {
                                status: ReminderStatus::Due.as_str().to_string(),
                                claimed_at: Some(now_string.clone()),
                                attempt: row.attempt + 1,
                                last_attempt_at: Some(now_string.clone()),
                                updated_at: now_string.clone(),
                                ..row
                            });
                        }
                    }
                    Ok(claimed)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        claimed_rows.into_iter().map(Reminder::try_from).collect()
    }

    /// Marks a claimed reminder as successfully delivered.
    ///
    /// Conditional on the reminder still being `due`; returns `false` if
    /// some other actor moved it first (e.g. a cancellation racing the
    /// delivery), in which case the caller must not emit a sent outcome.
    pub async fn mark_sent(&self, id: Uuid) -> Result<bool, StorageError> {
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
                diesel::update(
                    reminders::table
                        .filter(reminders::id.eq(id_blob))
                        .filter(reminders::status.eq(ReminderStatus::Due.as_str())),
                )
                .set((
                    reminders::status.eq(ReminderStatus::Sent.as_str()),
                    reminders::claimed_at.eq(None::<String>),
                    reminders::last_error.eq(None::<String>),
                    reminders::updated_at.eq(current_timestamp_string()),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    /// Records a failed delivery attempt on a claimed reminder.
    ///
    /// With `retry_at` set, the reminder goes back to `retrying` and becomes
    /// eligible again once the backoff window passes. Without it, the
    /// reminder is dead-lettered. Conditional on the reminder still being
    /// `due`; returns `false` if the transition lost a race.
    pub async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        let id_blob = uuid_to_blob(id);
        let error = error.to_string();
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let updated = conn
            .interact(move |conn| {
                let target = reminders::table
                    .filter(reminders::id.eq(id_blob))
                    .filter(reminders::status.eq(ReminderStatus::Due.as_str()));

                match retry_at {
                    Some(retry_at) => diesel::update(target)
                        .set((
                            reminders::status.eq(ReminderStatus::Retrying.as_str()),
                            reminders::scheduled_for.eq(datetime_to_string(retry_at)),
                            reminders::claimed_at.eq(None::<String>),
                            reminders::last_error.eq(Some(error)),
                            reminders::updated_at.eq(current_timestamp_string()),
                        ))
                        .execute(conn),
                    None => diesel::update(target)
                        .set((
                            reminders::status.eq(ReminderStatus::DeadLettered.as_str()),
                            reminders::claimed_at.eq(None::<String>),
                            reminders::last_error.eq(Some(error)),
                            reminders::updated_at.eq(current_timestamp_string()),
                        ))
                        .execute(conn),
                }
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    /// Lists claimed reminders whose claim is older than `cutoff`.
    ///
    /// A stale claim means a delivery consumer died mid-attempt. The
    /// scheduler treats each as a failed attempt and routes it back through
    /// [`Self::record_failure`].
    pub async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reminder>, StorageError> {
        let cutoff_string = datetime_to_string(cutoff);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let rows = conn
            .interact(move |conn| {
                reminders::table
                    .filter(reminders::status.eq(ReminderStatus::Due.as_str()))
                    .filter(reminders::claimed_at.le(cutoff_string))
                    .load::<ReminderRow>(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(Reminder::try_from).collect()
    }

    /// Lists a task's reminders, oldest first.
    pub async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Reminder>, StorageError> {
        let task_blob = uuid_to_blob(task_id);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let rows = conn
            .interact(move |conn| {
                reminders::table
                    .filter(reminders::task_id.eq(task_blob))
                    .order(reminders::created_at.asc())
                    .load::<ReminderRow>(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(Reminder::try_from).collect()
    }
}

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

//! Activity log data access operations. The log is append-only; there are
//! no update or delete paths.

use diesel::prelude::*;

use super::models::ActivityLogRow;
use super::DAL;
use crate::database::schema::activity_log;
use crate::error::StorageError;
use crate::models::activity_log::ActivityLogEntry;

/// Data access for the activity log.
pub struct ActivityLogDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> ActivityLogDAL<'a> {
    /// Appends one entry.
    pub async fn append(&self, entry: &ActivityLogEntry) -> Result<(), StorageError> {
        let row = ActivityLogRow::from_domain(entry);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(activity_log::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Lists a user's most recent entries, newest first.
    pub async fn recent_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ActivityLogEntry>, StorageError> {
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
                activity_log::table
                    .filter(activity_log::user_id.eq(user_id))
                    .order(activity_log::occurred_at.desc())
                    .limit(limit)
                    .load::<ActivityLogRow>(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(ActivityLogEntry::try_from).collect()
    }
}

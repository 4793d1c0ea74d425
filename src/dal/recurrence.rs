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

//! Recurrence pattern data access operations.

use diesel::prelude::*;
use uuid::Uuid;

use super::models::{uuid_to_blob, RecurrencePatternRow};
use super::DAL;
use crate::database::schema::recurrence_patterns;
use crate::error::StorageError;
use crate::models::recurrence::RecurrencePattern;

/// Data access for recurrence patterns.
pub struct RecurrenceDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> RecurrenceDAL<'a> {
    /// Inserts a new pattern row.
    pub async fn create(&self, pattern: &RecurrencePattern) -> Result<(), StorageError> {
        let row = RecurrencePatternRow::from_domain(pattern);
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(recurrence_patterns::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Fetches a pattern by id.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<RecurrencePattern>, StorageError> {
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
                recurrence_patterns::table
                    .filter(recurrence_patterns::id.eq(id_blob))
                    .first::<RecurrencePatternRow>(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        row.map(RecurrencePattern::try_from).transpose()
    }

    /// Deletes a pattern row.
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
                diesel::delete(recurrence_patterns::table.filter(recurrence_patterns::id.eq(id_blob)))
                    .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if deleted == 0 {
            return Err(StorageError::NotFound {
                entity: "recurrence pattern",
                id,
            });
        }
        Ok(())
    }
}

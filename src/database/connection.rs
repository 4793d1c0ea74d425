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

//! Database connection management for the SQLite backend.
//!
//! This module provides an async connection pool implementation using
//! `deadpool-diesel`. The pool is `Clone` and safe to share across the
//! background services; each clone references the same underlying pool.
//!
//! Connection strings accept a `sqlite://` prefix, a plain file path, or
//! `:memory:` for ephemeral databases in tests.

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use tracing::info;

use crate::error::RuntimeError;

/// A pool of SQLite database connections.
///
/// SQLite has limited concurrent write support even with WAL mode, so the
/// pool is held at a single connection. This also serializes the scanner's
/// conditional claim updates, which keeps the claim semantics simple.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Database(sqlite)")
    }
}

impl Database {
    /// Creates a new connection pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot be created.
    pub fn new(connection_string: &str) -> Self {
        let url = Self::build_url(connection_string);
        let manager = Manager::new(url, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .expect("Failed to create SQLite connection pool");

        info!("SQLite connection pool initialized");

        Self { pool }
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Strips the `sqlite://` prefix if present.
    fn build_url(connection_string: &str) -> String {
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Runs pending migrations and sets the SQLite pragmas.
    ///
    /// WAL mode allows concurrent reads during writes; busy_timeout makes
    /// SQLite wait instead of immediately failing on a locked database.
    pub async fn run_migrations(&self) -> Result<(), RuntimeError> {
        use diesel_migrations::MigrationHarness;

        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| RuntimeError::DatabaseConnection {
                message: e.to_string(),
            })?;

        conn.interact(|conn| {
            use diesel::prelude::*;

            diesel::sql_query("PRAGMA journal_mode=WAL;")
                .execute(conn)
                .map_err(|e| format!("Failed to set WAL mode: {}", e))?;
            diesel::sql_query("PRAGMA busy_timeout=30000;")
                .execute(conn)
                .map_err(|e| format!("Failed to set busy_timeout: {}", e))?;
            diesel::sql_query("PRAGMA foreign_keys=ON;")
                .execute(conn)
                .map_err(|e| format!("Failed to enable foreign keys: {}", e))?;

            conn.run_pending_migrations(crate::database::MIGRATIONS)
                .map_err(|e| format!("Failed to run migrations: {}", e))?;

            Ok::<_, String>(())
        })
        .await
        .map_err(|e| RuntimeError::Migration {
            message: e.to_string(),
        })?
        .map_err(|message| RuntimeError::Migration { message })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_connection_strings() {
        assert_eq!(
            Database::build_url("/path/to/database.db"),
            "/path/to/database.db"
        );
        assert_eq!(Database::build_url(":memory:"), ":memory:");
        assert_eq!(Database::build_url("./database.db"), "./database.db");
        assert_eq!(
            Database::build_url("sqlite:///path/to/db.sqlite"),
            "/path/to/db.sqlite"
        );
    }
}

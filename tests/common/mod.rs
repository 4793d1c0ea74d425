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

//! Shared harness for integration tests: a fresh migrated SQLite database
//! per test, plus the bus and task store wired the way the runtime wires
//! them.

use std::sync::Arc;

use tempfile::TempDir;

use tocsin::bus::{EventBus, TaskEventProducer};
use tocsin::dal::DAL;
use tocsin::database::Database;
use tocsin::store::TaskStore;

pub struct Harness {
    // Held so the database file outlives the test.
    _dir: TempDir,
    pub dal: DAL,
    pub bus: EventBus,
    pub store: Arc<TaskStore>,
}

pub async fn harness() -> Harness {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("tocsin-test.db");
    let database = Database::new(path.to_str().expect("non-utf8 temp path"));
    database
        .run_migrations()
        .await
        .expect("failed to run migrations");

    let dal = DAL::new(database);
    let bus = EventBus::new();
    let store = Arc::new(TaskStore::new(
        dal.clone(),
        TaskEventProducer::new(bus.clone()),
        "in-app",
    ));

    Harness {
        _dir: dir,
        dal,
        bus,
        store,
    }
}

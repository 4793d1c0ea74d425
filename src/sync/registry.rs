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

//! Per-user connection registry.
//!
//! A user may hold any number of live connections (one per device or tab).
//! Each connection owns a bounded queue; pushes use `try_send`, so one slow
//! or dead connection never blocks the fanout or its sibling connections.
//! A connection whose queue is full or closed is evicted in place during
//! the broadcast that discovers it.
//!
//! The outer map is keyed by user and guarded by a `RwLock`; each user's
//! connection list has its own `Mutex`, so broadcasts to different users
//! don't contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::models::sync::SyncMessage;
use uuid::Uuid;

/// Identifies one registered connection; returned by
/// [`ConnectionRegistry::register`] and used for heartbeats and
/// unregistration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
}

struct Connection {
    id: Uuid,
    sender: mpsc::Sender<SyncMessage>,
    last_heartbeat: DateTime<Utc>,
}

/// Tracks every live client connection, grouped by user.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Mutex<Vec<Connection>>>>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Registers a new connection for a user.
    ///
    /// Returns the handle and the receiving end of the connection's queue;
    /// the transport drains the receiver onto the wire.
    pub async fn register(&self, user_id: &str) -> (ConnectionHandle, mpsc::Receiver<SyncMessage>) {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let connection = Connection {
            id: Uuid::new_v4(),
            sender,
            last_heartbeat: Utc::now(),
        };
        let handle = ConnectionHandle {
            id: connection.id,
            user_id: user_id.to_string(),
        };

        let entry = {
            let mut map = self.connections.write().await;
            map.entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
                .clone()
        };
        entry.lock().await.push(connection);

        info!(user_id, connection_id = %handle.id, "Connection registered");
        (handle, receiver)
    }

    /// Removes a connection. Unknown handles are a no-op; eviction may have
    /// got there first.
    pub async fn unregister(&self, handle: &ConnectionHandle) {
        let entry = {
            let map = self.connections.read().await;
            map.get(&handle.user_id).cloned()
        };
        let Some(entry) = entry else { return };

        let mut list = entry.lock().await;
        let before = list.len();
        list.retain(|c| c.id != handle.id);
        if list.len() < before {
            info!(user_id = %handle.user_id, connection_id = %handle.id, "Connection unregistered");
        }
    }

    /// Pushes a message to every live connection of one user.
    ///
    /// Returns the number of connections the message was queued on. Dead
    /// connections (closed receiver) and slow ones (full queue) are evicted
    /// as they are discovered.
    pub async fn broadcast(&self, user_id: &str, message: &SyncMessage) -> usize {
        let entry = {
            let map = self.connections.read().await;
            map.get(user_id).cloned()
        };
        let Some(entry) = entry else { return 0 };

        let mut list = entry.lock().await;
        let mut delivered = 0;
        list.retain(|connection| match connection.sender.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    user_id,
                    connection_id = %connection.id,
                    "Connection queue full, evicting slow connection"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user_id, connection_id = %connection.id, "Connection closed, evicting");
                false
            }
        });
        delivered
    }

    /// Records a heartbeat for a connection.
    pub async fn record_heartbeat(&self, handle: &ConnectionHandle) {
        let entry = {
            let map = self.connections.read().await;
            map.get(&handle.user_id).cloned()
        };
        let Some(entry) = entry else { return };

        let mut list = entry.lock().await;
        if let Some(connection) = list.iter_mut().find(|c| c.id == handle.id) {
            connection.last_heartbeat = Utc::now();
        }
    }

    /// Evicts connections that have not sent a heartbeat within `max_idle`.
    ///
    /// Returns the number evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let entries: Vec<Arc<Mutex<Vec<Connection>>>> = {
            let map = self.connections.read().await;
            map.values().cloned().collect()
        };

        let mut evicted = 0;
        for entry in entries {
            let mut list = entry.lock().await;
            let before = list.len();
            list.retain(|c| c.last_heartbeat >= cutoff);
            evicted += before - list.len();
        }
        if evicted > 0 {
            info!(evicted, "Evicted idle connections");
        }
        evicted
    }

    /// Number of live connections for a user.
    pub async fn connection_count(&self, user_id: &str) -> usize {
        let entry = {
            let map = self.connections.read().await;
            map.get(user_id).cloned()
        };
        match entry {
            Some(entry) => entry.lock().await.len(),
            None => 0,
        }
    }
}

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

//! Real-time sync: the per-user connection registry and the event fanout.
//!
//! The transport layer (WebSocket server or otherwise) lives outside this
//! crate. It registers a connection per client, drains the returned
//! receiver onto the wire, and unregisters on disconnect. Everything else
//! is handled here.

pub mod fanout;
pub mod registry;

pub use fanout::SyncFanout;
pub use registry::{ConnectionHandle, ConnectionRegistry};

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

//! Runtime wiring.
//!
//! The [`Runtime`] owns the database, the bus, the connection registry, and
//! every background service. Construction opens the pool and runs
//! migrations; the services are spawned immediately and run until
//! [`Runtime::shutdown`] broadcasts the stop signal and joins them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::activity::ActivityLogger;
use crate::bus::{EventBus, TaskEventProducer};
use crate::dal::DAL;
use crate::database::Database;
use crate::delivery::{DeliveryConsumer, InAppChannel, NotificationChannel};
use crate::error::RuntimeError;
use crate::recurrence::RecurrenceWorker;
use crate::retry::RetryPolicy;
use crate::scheduler::ReminderScheduler;
use crate::store::{TaskService, TaskStore};
use crate::sync::fanout::SyncFanout;
use crate::sync::registry::ConnectionRegistry;

/// Tuning knobs for the runtime and its services.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How often the scheduler scans for due reminders
    pub tick_interval: Duration,
    /// Max reminders claimed per scan
    pub batch_size: i64,
    /// Per-attempt delivery timeout
    pub delivery_timeout: Duration,
    /// Retry budget and backoff for failed deliveries
    pub retry_policy: RetryPolicy,
    /// How long a claim may sit before it counts as abandoned
    pub stale_claim_grace: Duration,
    /// Per-topic bus channel capacity
    pub bus_capacity: usize,
    /// Per-connection push queue capacity
    pub connection_queue_capacity: usize,
    /// How often idle connections are swept
    pub eviction_interval: Duration,
    /// Heartbeat age past which a connection is evicted
    pub max_connection_idle: Duration,
    /// Channel name stamped on newly scheduled reminders
    pub default_delivery_channel: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            batch_size: 100,
            delivery_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
            stale_claim_grace: Duration::from_secs(300),
            bus_capacity: 256,
            connection_queue_capacity: 32,
            eviction_interval: Duration::from_secs(60),
            max_connection_idle: Duration::from_secs(300),
            default_delivery_channel: "in-app".to_string(),
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> Result<(), RuntimeError> {
        if self.tick_interval.is_zero() {
            return Err(RuntimeError::Configuration {
                message: "tick_interval must be non-zero".to_string(),
            });
        }
        if self.batch_size < 1 {
            return Err(RuntimeError::Configuration {
                message: format!("batch_size must be >= 1, got {}", self.batch_size),
            });
        }
        if self.connection_queue_capacity == 0 {
            return Err(RuntimeError::Configuration {
                message: "connection_queue_capacity must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Owns and runs the whole reminder and recurrence subsystem.
pub struct Runtime {
    dal: DAL,
    bus: EventBus,
    registry: Arc<ConnectionRegistry>,
    task_service: Arc<TaskStore>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Creates a runtime with default configuration.
    pub async fn new(database_url: &str) -> Result<Self, RuntimeError> {
        Self::with_config(database_url, RuntimeConfig::default()).await
    }

    /// Creates a runtime, opens the database, runs migrations, and spawns
    /// every background service.
    pub async fn with_config(
        database_url: &str,
        config: RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let database = Database::new(database_url);
        database.run_migrations().await?;

        let dal = DAL::new(database);
        let bus = EventBus::with_capacity(config.bus_capacity);
        let registry = Arc::new(ConnectionRegistry::new(config.connection_queue_capacity));
        let task_service = Arc::new(TaskStore::new(
            dal.clone(),
            TaskEventProducer::new(bus.clone()),
            config.default_delivery_channel.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::new();

        let stale_grace = chrono::Duration::from_std(config.stale_claim_grace).map_err(|e| {
            RuntimeError::Configuration {
                message: format!("stale_claim_grace out of range: {}", e),
            }
        })?;

        let scheduler = ReminderScheduler::new(
            dal.clone(),
            bus.clone(),
            config.retry_policy.clone(),
            config.tick_interval,
            config.batch_size,
            stale_grace,
        );
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            scheduler.run(shutdown_rx).await;
        }));

        let channel: Arc<dyn NotificationChannel> = Arc::new(InAppChannel::new(registry.clone()));
        let consumer = DeliveryConsumer::new(
            dal.clone(),
            bus.clone(),
            channel,
            config.retry_policy.clone(),
            config.delivery_timeout,
        );
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            consumer.run(shutdown_rx).await;
        }));

        let worker = RecurrenceWorker::new(
            dal.clone(),
            bus.clone(),
            task_service.clone() as Arc<dyn TaskService>,
        );
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            worker.run(shutdown_rx).await;
        }));

        let fanout = SyncFanout::new(bus.clone(), registry.clone());
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            fanout.run(shutdown_rx).await;
        }));

        let logger = ActivityLogger::new(dal.clone(), bus.clone());
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            logger.run(shutdown_rx).await;
        }));

        // Idle-connection sweeper.
        let sweep_registry = registry.clone();
        let eviction_interval = config.eviction_interval;
        let max_idle = chrono::Duration::from_std(config.max_connection_idle).map_err(|e| {
            RuntimeError::Configuration {
                message: format!("max_connection_idle out of range: {}", e),
            }
        })?;
        let mut shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(eviction_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sweep_registry.evict_idle(max_idle).await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        }));

        info!("Runtime started with {} background services", handles.len());

        Ok(Self {
            dal,
            bus,
            registry,
            task_service,
            shutdown_tx,
            handles,
        })
    }

    /// The task write interface.
    pub fn task_service(&self) -> Arc<dyn TaskService> {
        self.task_service.clone()
    }

    /// The connection registry, for the transport layer.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// The event bus, for additional consumers.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Direct data access, for read endpoints.
    pub fn dal(&self) -> DAL {
        self.dal.clone()
    }

    /// Signals every service to stop and waits for them to finish.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        info!("Runtime shutting down");
        // Receivers may already be gone if every service exited on its own.
        let _ = self.shutdown_tx.send(());

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Background service panicked during shutdown: {}", e);
            }
        }

        info!("Runtime shutdown complete");
        Ok(())
    }
}

//! Stream Hub
//!
//! Owns the broker, the process-wide shutdown token and the set of running
//! session tasks.
//!
//! Shutdown is two-phase: cancelling the shared token wakes every session
//! loop, then `close_all` releases the registry. Closing a queue is itself a
//! wake source, so no session can stay parked on a released queue.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::broker::{Broker, ConnectionId, PublishOutcome};
use super::session::{FrameSink, ReadingSource, Session, DEFAULT_FALLBACK_DELAY};
use crate::config::StreamConfig;
use crate::domain::Reading;

/// Tunables for sessions started by the hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Delay before a session's one-shot fallback poll
    pub fallback_delay: Duration,
    /// How long `shutdown` waits for session tasks
    pub shutdown_grace: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl From<&StreamConfig> for HubConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            fallback_delay: Duration::from_millis(config.fallback_delay_ms),
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        }
    }
}

/// Entry point for accepting streams and publishing readings
pub struct StreamHub {
    broker: Arc<Broker>,
    source: Arc<dyn ReadingSource>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    config: HubConfig,
}

impl StreamHub {
    pub fn new(broker: Arc<Broker>, source: Arc<dyn ReadingSource>, config: HubConfig) -> Self {
        Self {
            broker,
            source,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            config,
        }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Publish injection point for the ingestion path
    pub fn publish(&self, sensor_id: i64, reading: Reading) -> PublishOutcome {
        self.broker.publish(sensor_id, reading)
    }

    /// Start a session for an accepted connection
    ///
    /// `cancel` is the connection's own scope; the hub adds the shared
    /// shutdown signal. The subscription exists when this returns.
    pub fn attach<S>(&self, sink: S, sensor_id: i64, cancel: CancellationToken) -> ConnectionId
    where
        S: FrameSink + 'static,
    {
        let session = Session::start(
            Arc::clone(&self.broker),
            Arc::clone(&self.source),
            sink,
            sensor_id,
            cancel,
            self.shutdown.clone(),
        )
        .fallback_delay(self.config.fallback_delay);

        let connection_id = session.connection_id();
        self.tasks.spawn(session.run());
        connection_id
    }

    /// Spawn an auxiliary task that ends with the hub's sessions
    pub(crate) fn spawn_tracked<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Number of live streaming connections
    pub fn active_streams(&self) -> usize {
        self.broker.connection_count()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Signal every session to stop and release all queues
    pub fn begin_shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::info!(
            streams = self.broker.connection_count(),
            "Shutting down stream sessions"
        );
        self.shutdown.cancel();
        self.broker.close_all();
        self.tasks.close();
    }

    /// Shut down and wait up to the configured grace period for sessions
    ///
    /// Returns `true` if every tracked task finished in time.
    pub async fn shutdown(&self) -> bool {
        self.begin_shutdown();
        match tokio::time::timeout(self.config.shutdown_grace, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    remaining = self.tasks.len(),
                    "Stream tasks still running after grace period"
                );
                false
            }
        }
    }
}

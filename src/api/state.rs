//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::StreamConfig;
use crate::repository::Repositories;
use crate::service::{EventService, SensorService, UserService};
use crate::stream::{Broker, HubConfig, StreamHub};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub sensors: Arc<SensorService>,
    pub users: Arc<UserService>,
    pub events: Arc<EventService>,
    /// Broker and streaming sessions
    pub hub: Arc<StreamHub>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire services and the stream hub over one set of repositories
    pub fn new(repos: &Repositories, stream: &StreamConfig) -> Self {
        let sensors = Arc::new(SensorService::new(repos.sensors.clone()));
        let users = Arc::new(UserService::new(
            repos.users.clone(),
            repos.owners.clone(),
            repos.sensors.clone(),
        ));
        let events = Arc::new(EventService::new(repos.events.clone(), repos.sensors.clone()));

        let broker = Arc::new(Broker::new(stream.queue_capacity));
        let hub = Arc::new(StreamHub::new(
            broker,
            events.clone(),
            HubConfig::from(stream),
        ));

        Self {
            sensors,
            users,
            events,
            hub,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

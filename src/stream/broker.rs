//! Reading Broker
//!
//! Process-wide registry mapping each streaming connection to one bounded
//! delivery queue, and each sensor id to the connections interested in it.
//!
//! All operations are synchronous. Registry shape is guarded by a single
//! reader/writer lock: subscribe, unsubscribe and close_all take it
//! exclusively, publish takes it shared so concurrent publishers fan out in
//! parallel. Queue contents need no lock because each queue has exactly one
//! writer side (the broker) and one reader (its session).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::domain::Reading;

/// Default number of readings a queue absorbs before dropping
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Unique identifier for a streaming connection (server-generated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Receive side of one connection's bounded delivery queue
///
/// Yields `None` once the broker has closed the queue (unsubscribe or
/// close_all) and every buffered reading has been taken.
pub struct DeliveryQueue {
    connection_id: ConnectionId,
    sensor_id: i64,
    receiver: Mutex<mpsc::Receiver<Arc<Reading>>>,
}

impl DeliveryQueue {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Sensor this queue was created for
    pub fn sensor_id(&self) -> i64 {
        self.sensor_id
    }

    /// Wait for the next reading. Cancel-safe.
    pub async fn recv(&self) -> Option<Arc<Reading>> {
        self.receiver.lock().await.recv().await
    }

    /// Take a buffered reading without waiting
    pub fn try_recv(&self) -> Option<Arc<Reading>> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Whether the broker has released this queue
    pub fn is_closed(&self) -> bool {
        match self.receiver.try_lock() {
            Ok(receiver) => receiver.is_closed(),
            // Only the session holds the lock, and only while it is alive
            Err(_) => false,
        }
    }
}

struct Registration {
    sensor_id: i64,
    sender: mpsc::Sender<Arc<Reading>>,
    queue: Arc<DeliveryQueue>,
}

#[derive(Default)]
struct Registry {
    subscriptions: HashMap<ConnectionId, Registration>,
    /// sensor id → connections subscribed to it
    interest: HashMap<i64, HashSet<ConnectionId>>,
    closed: bool,
}

/// Outcome of a single publish call, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// In-memory pub/sub registry distributing readings to subscriber queues
pub struct Broker {
    registry: RwLock<Registry>,
    capacity: usize,
}

impl Broker {
    /// Create a broker whose queues hold `capacity` readings (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a connection's interest in a sensor
    ///
    /// A connection owns at most one queue for its whole lifetime: calling
    /// this again returns the existing queue unchanged, keeping the original
    /// sensor affinity. After [`Broker::close_all`] the returned queue is
    /// already closed and nothing is registered.
    pub fn subscribe(&self, connection_id: ConnectionId, sensor_id: i64) -> Arc<DeliveryQueue> {
        let mut registry = self.write();

        if let Some(existing) = registry.subscriptions.get(&connection_id) {
            return Arc::clone(&existing.queue);
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        let queue = Arc::new(DeliveryQueue {
            connection_id,
            sensor_id,
            receiver: Mutex::new(receiver),
        });

        if registry.closed {
            // Dropping the sender closes the queue immediately
            drop(sender);
            return queue;
        }

        registry
            .interest
            .entry(sensor_id)
            .or_default()
            .insert(connection_id);
        registry.subscriptions.insert(
            connection_id,
            Registration {
                sensor_id,
                sender,
                queue: Arc::clone(&queue),
            },
        );

        tracing::debug!(connection_id = %connection_id, sensor_id, "Subscribed");
        queue
    }

    /// Release a connection's queue and interest
    ///
    /// Returns `true` if the connection was registered. The queue is closed
    /// by dropping its sender, which wakes the session's receive side.
    pub fn unsubscribe(&self, connection_id: &ConnectionId) -> bool {
        let mut registry = self.write();

        let Some(registration) = registry.subscriptions.remove(connection_id) else {
            return false;
        };

        if let Some(interested) = registry.interest.get_mut(&registration.sensor_id) {
            interested.remove(connection_id);
            if interested.is_empty() {
                registry.interest.remove(&registration.sensor_id);
            }
        }

        tracing::debug!(
            connection_id = %connection_id,
            sensor_id = registration.sensor_id,
            "Unsubscribed"
        );
        true
    }

    /// Offer a reading to every connection interested in `sensor_id`
    ///
    /// Never blocks and never fails: a full queue drops the reading for that
    /// subscriber only, and entries without a live queue are skipped.
    pub fn publish(&self, sensor_id: i64, reading: Reading) -> PublishOutcome {
        let reading = Arc::new(reading);
        let registry = self.read();
        let mut outcome = PublishOutcome::default();

        let Some(interested) = registry.interest.get(&sensor_id) else {
            return outcome;
        };

        for connection_id in interested {
            let Some(registration) = registry.subscriptions.get(connection_id) else {
                continue;
            };
            match registration.sender.try_send(Arc::clone(&reading)) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => outcome.dropped += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        if outcome.dropped > 0 {
            tracing::trace!(
                sensor_id,
                delivered = outcome.delivered,
                dropped = outcome.dropped,
                "Dropped reading for saturated subscribers"
            );
        }
        outcome
    }

    /// Close every queue and clear all registrations
    ///
    /// Returns the number of queues closed. Later subscribes receive closed
    /// queues and later publishes are no-ops.
    pub fn close_all(&self) -> usize {
        let mut registry = self.write();
        registry.closed = true;
        let closed = registry.subscriptions.len();
        registry.subscriptions.clear();
        registry.interest.clear();

        tracing::info!(queues = closed, "Closed all subscriber queues");
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Number of connections holding a queue
    pub fn connection_count(&self) -> usize {
        self.read().subscriptions.len()
    }

    /// Number of sensors with at least one interested connection
    pub fn sensor_count(&self) -> usize {
        self.read().interest.len()
    }

    /// Number of connections interested in a sensor
    pub fn interest_count(&self, sensor_id: i64) -> usize {
        self.read()
            .interest
            .get(&sensor_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    // Critical sections never panic, so a poisoned lock still guards
    // consistent maps.
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

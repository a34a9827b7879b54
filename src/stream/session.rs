//! Streaming Session
//!
//! One session per accepted streaming connection. The session subscribes on
//! construction, then races four sources until one ends it:
//!
//! 1. a one-shot fallback timer that re-publishes the latest stored reading
//! 2. readings arriving on its delivery queue, written out as text frames
//! 3. connection-scope cancellation (client gone)
//! 4. process shutdown
//!
//! Every exit path unsubscribes first and then closes the sink with a normal
//! closure.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::broker::{Broker, ConnectionId, DeliveryQueue};
use crate::domain::Reading;
use crate::service::ServiceResult;

/// Default delay before the fallback poll fires
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_millis(200);

/// Errors raised while emitting a frame
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to encode reading: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write frame: {0}")]
    Write(String),

    #[error("Failed to close connection: {0}")]
    Close(String),
}

/// Point-in-time lookup used by the fallback poll
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn latest_reading(&self, sensor_id: i64) -> ServiceResult<Reading>;
}

/// Outbound half of a streaming connection
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame
    async fn send_text(&mut self, text: String) -> Result<(), SessionError>;

    /// Close with normal-closure status
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Which source ended the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The connection's own scope was cancelled
    Cancelled,
    /// Process shutdown was signalled
    Shutdown,
    /// The broker closed the delivery queue
    QueueClosed,
}

/// Encode a reading as a frame payload
pub fn encode_frame(reading: &Reading) -> Result<String, SessionError> {
    Ok(serde_json::to_string(reading)?)
}

/// A subscribed streaming connection and everything its loop needs
pub struct Session<S> {
    connection_id: ConnectionId,
    sensor_id: i64,
    queue: Arc<DeliveryQueue>,
    broker: Arc<Broker>,
    source: Arc<dyn ReadingSource>,
    sink: S,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    fallback_delay: Duration,
}

impl<S: FrameSink> Session<S> {
    /// Subscribe a new connection to `sensor_id`
    ///
    /// Subscription happens here, before the loop is spawned, so readings
    /// published right after acceptance are already queued.
    pub fn start(
        broker: Arc<Broker>,
        source: Arc<dyn ReadingSource>,
        sink: S,
        sensor_id: i64,
        cancel: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        let connection_id = ConnectionId::new();
        let queue = broker.subscribe(connection_id, sensor_id);

        Self {
            connection_id,
            sensor_id,
            queue,
            broker,
            source,
            sink,
            cancel,
            shutdown,
            fallback_delay: DEFAULT_FALLBACK_DELAY,
        }
    }

    /// Builder method: set the fallback poll delay
    pub fn fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Drive the session to completion
    pub async fn run(mut self) -> SessionExit {
        tracing::info!(
            connection_id = %self.connection_id,
            sensor_id = self.sensor_id,
            "Stream session started"
        );

        let exit = self.multiplex().await;

        self.broker.unsubscribe(&self.connection_id);
        if let Err(e) = self.sink.close().await {
            tracing::debug!(connection_id = %self.connection_id, error = %e, "Close failed");
        }

        tracing::info!(
            connection_id = %self.connection_id,
            sensor_id = self.sensor_id,
            exit = ?exit,
            "Stream session ended"
        );
        exit
    }

    async fn multiplex(&mut self) -> SessionExit {
        let queue = Arc::clone(&self.queue);
        let broker = Arc::clone(&self.broker);
        let source = Arc::clone(&self.source);
        let cancel = self.cancel.clone();
        let shutdown = self.shutdown.clone();

        // One-shot: the fallback poll fires once per session, never again
        let fallback = tokio::time::sleep(self.fallback_delay);
        tokio::pin!(fallback);
        let mut fallback_pending = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return SessionExit::Cancelled,
                _ = shutdown.cancelled() => return SessionExit::Shutdown,
                reading = queue.recv() => {
                    let Some(reading) = reading else {
                        return SessionExit::QueueClosed;
                    };
                    let frame = match encode_frame(&reading) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(connection_id = %self.connection_id, error = %e, "Dropping unencodable reading");
                            continue;
                        }
                    };
                    tokio::select! {
                        result = self.sink.send_text(frame) => {
                            if let Err(e) = result {
                                tracing::warn!(connection_id = %self.connection_id, error = %e, "Frame write failed");
                            }
                        }
                        _ = cancel.cancelled() => return SessionExit::Cancelled,
                        _ = shutdown.cancelled() => return SessionExit::Shutdown,
                    }
                }
                () = &mut fallback, if fallback_pending => {
                    fallback_pending = false;
                    fallback_poll(&broker, source.as_ref(), self.connection_id, self.sensor_id).await;
                }
            }
        }
    }
}

/// Re-publish the latest stored reading through the normal delivery path
async fn fallback_poll(
    broker: &Broker,
    source: &dyn ReadingSource,
    connection_id: ConnectionId,
    sensor_id: i64,
) {
    match source.latest_reading(sensor_id).await {
        Ok(reading) => {
            broker.publish(sensor_id, reading);
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(
                connection_id = %connection_id,
                sensor_id,
                "No stored reading for fallback poll"
            );
        }
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                sensor_id,
                error = %e,
                "Fallback lookup failed"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::service::ServiceError;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Frames captured by a [`RecordingSink`]
    #[derive(Debug, PartialEq, Eq)]
    pub(crate) enum Frame {
        Text(String),
        Close,
    }

    pub(crate) struct RecordingSink {
        frames: mpsc::UnboundedSender<Frame>,
        fail_writes: bool,
        on_close: Option<CloseObserver>,
    }

    /// Broker registration counts `(connections, interest)` taken in `close`
    type RegistrationAtClose = Arc<Mutex<Option<(usize, usize)>>>;

    struct CloseObserver {
        broker: Arc<Broker>,
        sensor_id: i64,
        seen: RegistrationAtClose,
    }

    impl RecordingSink {
        pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
            let (frames, rx) = mpsc::unbounded_channel();
            (
                Self {
                    frames,
                    fail_writes: false,
                    on_close: None,
                },
                rx,
            )
        }

        fn observing(
            broker: &Arc<Broker>,
            sensor_id: i64,
        ) -> (Self, mpsc::UnboundedReceiver<Frame>, RegistrationAtClose) {
            let (mut sink, rx) = Self::new();
            let seen = RegistrationAtClose::default();
            sink.on_close = Some(CloseObserver {
                broker: Arc::clone(broker),
                sensor_id,
                seen: Arc::clone(&seen),
            });
            (sink, rx, seen)
        }

        fn failing() -> (Self, mpsc::UnboundedReceiver<Frame>) {
            let (mut sink, rx) = Self::new();
            sink.fail_writes = true;
            (sink, rx)
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
            if self.fail_writes {
                return Err(SessionError::Write("broken pipe".to_string()));
            }
            let _ = self.frames.send(Frame::Text(text));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            if let Some(observer) = &self.on_close {
                *observer.seen.lock().unwrap() = Some((
                    observer.broker.connection_count(),
                    observer.broker.interest_count(observer.sensor_id),
                ));
            }
            let _ = self.frames.send(Frame::Close);
            Ok(())
        }
    }

    /// Reading source returning a fixed answer and counting lookups
    #[derive(Default)]
    pub(crate) struct StaticSource {
        reading: Mutex<Option<Reading>>,
        pub(crate) lookups: AtomicUsize,
    }

    impl StaticSource {
        pub(crate) fn with(reading: Reading) -> Self {
            Self {
                reading: Mutex::new(Some(reading)),
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReadingSource for StaticSource {
        async fn latest_reading(&self, _sensor_id: i64) -> ServiceResult<Reading> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.reading
                .lock()
                .unwrap()
                .clone()
                .ok_or(ServiceError::EventNotFound)
        }
    }

    fn reading(sensor_id: i64, payload: i64) -> Reading {
        Reading::new("0123456789", payload)
            .timestamp(Utc::now())
            .sensor(sensor_id)
    }

    fn start(
        broker: &Arc<Broker>,
        source: Arc<dyn ReadingSource>,
        sink: RecordingSink,
        sensor_id: i64,
    ) -> (Session<RecordingSink>, CancellationToken, CancellationToken) {
        let cancel = CancellationToken::new();
        let shutdown = CancellationToken::new();
        let session = Session::start(
            Arc::clone(broker),
            source,
            sink,
            sensor_id,
            cancel.clone(),
            shutdown.clone(),
        );
        (session, cancel, shutdown)
    }

    fn payload_of(frame: &Frame) -> serde_json::Value {
        match frame {
            Frame::Text(text) => serde_json::from_str(text).unwrap(),
            Frame::Close => panic!("Expected text frame"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushed_reading_becomes_frame_before_fallback() {
        let broker = Arc::new(Broker::default());
        let source = Arc::new(StaticSource::default());
        let (sink, mut frames) = RecordingSink::new();
        let (session, cancel, _shutdown) = start(&broker, source.clone(), sink, 7);
        let handle = tokio::spawn(session.run());

        broker.publish(7, reading(7, 42));

        let frame = frames.recv().await.unwrap();
        let json = payload_of(&frame);
        assert_eq!(json["payload"], 42);
        assert_eq!(json["sensor_id"], 7);
        assert_eq!(source.lookups.load(Ordering::SeqCst), 0);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), SessionExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_poll_fires_once() {
        let broker = Arc::new(Broker::default());
        let source = Arc::new(StaticSource::with(reading(3, 11)));
        let (sink, mut frames) = RecordingSink::new();
        let (session, cancel, _shutdown) = start(&broker, source.clone(), sink, 3);
        let handle = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let frame = frames.recv().await.unwrap();
        assert_eq!(payload_of(&frame)["payload"], 11);

        // Long idle period: the one-shot timer never re-arms
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
        assert!(frames.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_miss_keeps_session_alive() {
        let broker = Arc::new(Broker::default());
        let source = Arc::new(StaticSource::default());
        let (sink, mut frames) = RecordingSink::new();
        let (session, cancel, _shutdown) = start(&broker, source.clone(), sink, 3);
        let handle = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);

        broker.publish(3, reading(3, 5));
        assert_eq!(payload_of(&frames.recv().await.unwrap())["payload"], 5);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_does_not_end_session() {
        let broker = Arc::new(Broker::default());
        let (sink, mut frames) = RecordingSink::failing();
        let (session, cancel, _shutdown) =
            start(&broker, Arc::new(StaticSource::default()), sink, 1);
        let handle = tokio::spawn(session.run());

        broker.publish(1, reading(1, 1));
        broker.publish(1, reading(1, 2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert_eq!(broker.connection_count(), 1);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), SessionExit::Cancelled);
        assert_eq!(frames.recv().await, Some(Frame::Close));
    }

    #[tokio::test]
    async fn test_cancel_unsubscribes_then_closes() {
        let broker = Arc::new(Broker::default());
        let (sink, mut frames, at_close) = RecordingSink::observing(&broker, 9);
        let (session, cancel, _shutdown) =
            start(&broker, Arc::new(StaticSource::default()), sink, 9);
        assert_eq!(broker.interest_count(9), 1);
        let handle = tokio::spawn(session.run());

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), SessionExit::Cancelled);
        assert_eq!(frames.recv().await, Some(Frame::Close));

        // The registration was already gone when the socket closed
        assert_eq!(*at_close.lock().unwrap(), Some((0, 0)));
    }

    #[tokio::test]
    async fn test_shutdown_ends_session() {
        let broker = Arc::new(Broker::default());
        let (sink, mut frames) = RecordingSink::new();
        let (session, _cancel, shutdown) =
            start(&broker, Arc::new(StaticSource::default()), sink, 2);
        let handle = tokio::spawn(session.run());

        shutdown.cancel();
        broker.close_all();

        assert_eq!(handle.await.unwrap(), SessionExit::Shutdown);
        assert_eq!(frames.recv().await, Some(Frame::Close));
    }

    #[tokio::test]
    async fn test_queue_close_ends_session() {
        let broker = Arc::new(Broker::default());
        let (sink, _frames) = RecordingSink::new();
        let (session, _cancel, _shutdown) =
            start(&broker, Arc::new(StaticSource::default()), sink, 2);
        let handle = tokio::spawn(session.run());

        broker.close_all();

        assert_eq!(handle.await.unwrap(), SessionExit::QueueClosed);
    }

    #[tokio::test]
    async fn test_readings_for_other_sensors_are_not_sent() {
        let broker = Arc::new(Broker::default());
        let (sink, mut frames) = RecordingSink::new();
        let (session, cancel, _shutdown) =
            start(&broker, Arc::new(StaticSource::default()), sink, 1);
        let handle = tokio::spawn(session.run());

        broker.publish(2, reading(2, 100));
        broker.publish(1, reading(1, 200));

        assert_eq!(payload_of(&frames.recv().await.unwrap())["payload"], 200);
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(frames.recv().await, Some(Frame::Close));
        assert!(frames.recv().await.is_none());
    }

    #[test]
    fn test_encode_frame_matches_reading_schema() {
        let r = reading(4, 9);
        let frame = encode_frame(&r).unwrap();
        let decoded: Reading = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded, r);
    }
}

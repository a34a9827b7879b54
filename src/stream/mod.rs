//! Real-time reading distribution
//!
//! The ingestion path publishes each stored reading to the [`Broker`], which
//! fans it out to the bounded queue of every connection subscribed to that
//! sensor. Each accepted connection runs a [`Session`] that drains its queue
//! to the client, fires a one-shot fallback poll, and ends on client
//! disconnect, queue closure, or process shutdown.
//!
//! ## Modules
//!
//! - **broker**: subscription registry and non-blocking fan-out
//! - **session**: per-connection multiplex loop
//! - **hub**: session task tracking and two-phase shutdown
//! - **ws**: WebSocket transport

pub mod broker;
pub mod hub;
pub mod session;
pub mod ws;

pub use broker::{Broker, ConnectionId, DeliveryQueue, PublishOutcome, DEFAULT_QUEUE_CAPACITY};
pub use hub::{HubConfig, StreamHub};
pub use session::{
    encode_frame, FrameSink, ReadingSource, Session, SessionError, SessionExit,
    DEFAULT_FALLBACK_DELAY,
};
pub use ws::{accept, WsSink};

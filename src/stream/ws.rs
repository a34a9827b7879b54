//! WebSocket transport for stream sessions
//!
//! Splits an upgraded socket into the session's [`FrameSink`] and a reader
//! task. The reader owns nothing but the inbound half: it discards client
//! frames and cancels the connection scope on close or receive error.

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use super::broker::ConnectionId;
use super::hub::StreamHub;
use super::session::{FrameSink, SessionError};

/// Outbound half of an upgraded socket
pub struct WsSink {
    sender: SplitSink<WebSocket, Message>,
    scope: CancellationToken,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, Message>, scope: CancellationToken) -> Self {
        Self { sender, scope }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|e| SessionError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        // The reader stops once the session has closed its side
        self.scope.cancel();

        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "Closed".into(),
        };
        self.sender
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| SessionError::Close(e.to_string()))?;
        self.sender
            .close()
            .await
            .map_err(|e| SessionError::Close(e.to_string()))
    }
}

/// Start streaming `sensor_id` readings over an upgraded socket
pub fn accept(hub: &StreamHub, socket: WebSocket, sensor_id: i64) -> ConnectionId {
    let (sender, receiver) = socket.split();
    let scope = CancellationToken::new();

    let connection_id = hub.attach(WsSink::new(sender, scope.clone()), sensor_id, scope.clone());
    hub.spawn_tracked(drain_inbound(receiver, scope, connection_id));
    connection_id
}

/// Read and discard client frames until the peer goes away
async fn drain_inbound(
    mut receiver: SplitStream<WebSocket>,
    scope: CancellationToken,
    connection_id: ConnectionId,
) {
    loop {
        tokio::select! {
            _ = scope.cancelled() => return,
            next = receiver.next() => match next {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(connection_id = %connection_id, "Client closed stream");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    }
    scope.cancel();
}

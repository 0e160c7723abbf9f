//! Event bus feeding the SSE stream.
//!
//! Broadcasts serialized JSON frames to every connected dashboard client.
//! Clients subscribe through the SSE endpoint; a client that lags past the
//! buffer or disconnects simply drops out of the channel.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

/// Size of the broadcast buffer. Loopback dashboards drain quickly; a
/// client this far behind is treated as gone.
const EVENT_BUFFER_SIZE: usize = 256;

/// Broadcast hub for daemon notifications.
pub struct EventBus {
    tx: broadcast::Sender<String>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    /// Number of currently connected stream clients.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscribe a new stream client.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Broadcast one payload to every connected client. A bus with no
    /// listeners swallows the frame.
    pub fn broadcast<T: Serialize>(&self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(err) => warn!(%err, "dropping unserializable broadcast payload"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

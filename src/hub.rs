//! Real-time push of session events
//!
//! Every transition the session driver makes is published here once;
//! the WebSocket feed forwards it to connected UIs. Publishing never
//! blocks: with no subscribers the event is dropped, and a subscriber
//! that falls behind skips ahead.
//!
//! ## Example Messages
//!
//! ```json
//! {"type": "qr", "data": "data:image/svg+xml;base64,..."}
//! {"type": "authenticated"}
//! {"type": "ready", "info": {"pushname": "Clinica", "wid": "34600000000@s.whatsapp.net"}}
//! {"type": "disconnected", "reason": "network", "reconnecting": true}
//! {"type": "message", "message": {"from": "...", "body": "Hola", ...}}
//! ```

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::relay::InboundMessage;
use crate::transport::Identity;

/// Buffered events per subscriber before it starts lagging
const HUB_CAPACITY: usize = 100;

/// Event pushed to real-time subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// New pairing challenge image
    Qr { data: String },
    /// Credentials accepted
    Authenticated,
    /// Link is live
    Ready { info: Identity },
    /// Link dropped; `reconnecting` is false after a sign-out
    Disconnected { reason: String, reconnecting: bool },
    /// Inbound message relayed from the transport
    Message { message: InboundMessage },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr { .. } => "qr",
            Self::Authenticated => "authenticated",
            Self::Ready { .. } => "ready",
            Self::Disconnected { .. } => "disconnected",
            Self::Message { .. } => "message",
        }
    }
}

/// Fan-out point for session events
pub struct EventHub {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish to every current subscriber
    pub fn broadcast(&self, event: SessionEvent) {
        trace!(event = event.name(), subscribers = self.sender.receiver_count(), "Publishing");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

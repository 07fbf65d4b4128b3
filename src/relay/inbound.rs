//! Inbound message relay

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::sink::InboundSink;
use crate::hub::{EventHub, SessionEvent};
use crate::transport::RawInbound;

/// Pseudo-chat carrying contacts' status updates
const STATUS_BROADCAST: &str = "status@broadcast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
    Other,
}

impl MessageKind {
    /// Classify a transport-native type tag
    pub fn from_transport(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "" | "chat" | "text" | "conversation" | "extendedtextmessage" => Self::Text,
            "audio" | "ptt" | "audiomessage" | "voice" => Self::Audio,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}

/// Message forwarded downstream
///
/// Serializes to the webhook contract `{from, body, type, timestamp, pushname}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    #[serde(rename = "from")]
    pub source_address: String,
    #[serde(rename = "body")]
    pub body_text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "timestamp")]
    pub server_timestamp: i64,
    #[serde(rename = "pushname", skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
}

impl InboundMessage {
    /// Map a raw transport event; `None` for echoes of our own sends and
    /// for status broadcasts
    pub fn from_raw(raw: RawInbound) -> Option<Self> {
        if raw.from_me || raw.from == STATUS_BROADCAST {
            return None;
        }

        Some(Self {
            kind: MessageKind::from_transport(&raw.message_type),
            source_address: raw.from,
            body_text: raw.body,
            server_timestamp: if raw.timestamp > 0 {
                raw.timestamp
            } else {
                chrono::Utc::now().timestamp()
            },
            sender_display_name: raw.pushname.filter(|name| !name.is_empty()),
        })
    }
}

/// Inbound half of the relay
pub struct InboundRelay {
    sink: Arc<dyn InboundSink>,
    hub: Arc<EventHub>,
}

impl InboundRelay {
    pub fn new(sink: Arc<dyn InboundSink>, hub: Arc<EventHub>) -> Self {
        Self { sink, hub }
    }

    /// Filter, map, push to subscribers and forward downstream
    ///
    /// Forwarding runs on its own task so the caller never waits on the
    /// backend. A failed forward is logged and dropped: a retry could
    /// duplicate clinic-side side effects such as auto-replies.
    pub fn handle_inbound(&self, raw: RawInbound) -> Option<InboundMessage> {
        let Some(message) = InboundMessage::from_raw(raw) else {
            debug!("Dropping self-sent or broadcast message");
            return None;
        };

        debug!(from = %message.source_address, kind = message.kind.as_str(), "Inbound message");
        self.hub.broadcast(SessionEvent::Message {
            message: message.clone(),
        });

        let sink = Arc::clone(&self.sink);
        let forwarded = message.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.forward(&forwarded).await {
                warn!(
                    from = %forwarded.source_address,
                    error = %e,
                    "Inbound forward failed, message dropped"
                );
            }
        });

        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::sink::SinkError;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct ChannelSink(mpsc::UnboundedSender<InboundMessage>);

    #[async_trait]
    impl InboundSink for ChannelSink {
        async fn forward(&self, message: &InboundMessage) -> Result<(), SinkError> {
            let _ = self.0.send(message.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl InboundSink for FailingSink {
        async fn forward(&self, _message: &InboundMessage) -> Result<(), SinkError> {
            Err(SinkError::Rejected(500))
        }
    }

    fn raw(from_me: bool) -> RawInbound {
        RawInbound {
            from: "34600000000@s.whatsapp.net".to_string(),
            body: "Quiero cambiar mi cita".to_string(),
            message_type: "chat".to_string(),
            timestamp: 1_700_000_000,
            pushname: Some("Ana".to_string()),
            from_me,
        }
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(MessageKind::from_transport("chat"), MessageKind::Text);
        assert_eq!(MessageKind::from_transport("conversation"), MessageKind::Text);
        assert_eq!(MessageKind::from_transport("ptt"), MessageKind::Audio);
        assert_eq!(MessageKind::from_transport("audioMessage"), MessageKind::Audio);
        assert_eq!(MessageKind::from_transport("image"), MessageKind::Other);
    }

    #[test]
    fn test_mapping_and_webhook_shape() {
        let message = InboundMessage::from_raw(raw(false)).unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["from"], "34600000000@s.whatsapp.net");
        assert_eq!(json["body"], "Quiero cambiar mi cita");
        assert_eq!(json["type"], "text");
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["pushname"], "Ana");

        let mut anonymous = raw(false);
        anonymous.pushname = None;
        let json = serde_json::to_value(InboundMessage::from_raw(anonymous).unwrap()).unwrap();
        assert!(json.as_object().unwrap().get("pushname").is_none());
    }

    #[test]
    fn test_echo_and_status_are_dropped() {
        assert!(InboundMessage::from_raw(raw(true)).is_none());

        let mut status = raw(false);
        status.from = STATUS_BROADCAST.to_string();
        assert!(InboundMessage::from_raw(status).is_none());
    }

    #[tokio::test]
    async fn test_self_sent_is_never_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(EventHub::new());
        let mut events = hub.subscribe();
        let relay = InboundRelay::new(Arc::new(ChannelSink(tx)), hub);

        assert!(relay.handle_inbound(raw(true)).is_none());
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inbound_is_forwarded_and_pushed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hub = Arc::new(EventHub::new());
        let mut events = hub.subscribe();
        let relay = InboundRelay::new(Arc::new(ChannelSink(tx)), Arc::clone(&hub));

        let message = relay.handle_inbound(raw(false)).unwrap();
        assert_eq!(rx.recv().await.unwrap(), message);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Message { message });
    }

    #[tokio::test]
    async fn test_forward_failure_is_swallowed() {
        let relay = InboundRelay::new(Arc::new(FailingSink), Arc::new(EventHub::new()));
        assert!(relay.handle_inbound(raw(false)).is_some());
        tokio::task::yield_now().await;
    }
}

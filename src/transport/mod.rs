//! Transport capability
//!
//! The wire protocol is never spoken here. A [`Transport`] is whatever can
//! hand us pairing challenges, connection-state changes and inbound
//! messages, and accept sends and teardown. The session driver is written
//! once against this trait; swapping the socket-based sidecar for the demo
//! mock (or anything else) does not touch the state machine.
//!
//! ## Implementations
//!
//! - [`MockTransport`] - demo mode, issues a fake challenge and logs sends
//! - [`SidecarTransport`] - JSON over WebSocket to an external protocol process

pub mod mock;
pub mod sidecar;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use mock::{MockTransport, MockTransportConfig};
pub use sidecar::{SidecarConfig, SidecarTransport};

/// Default addressing domain for individual WhatsApp accounts
pub const DEFAULT_ADDRESS_SUFFIX: &str = "s.whatsapp.net";

/// Stream of low-level events for one connection attempt
///
/// The stream ending is equivalent to `Closed(ConnectionLost)`.
pub type EventStream = mpsc::Receiver<TransportEvent>;

/// Errors raised by a transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The transport could not be brought up at all
    #[error("connect failed: {0}")]
    Connect(String),

    /// No live link to send on
    #[error("transport not connected")]
    NotConnected,

    /// The transport accepted a request but it failed
    #[error("request failed: {0}")]
    Request(String),

    /// No answer within the configured timeout
    #[error("request timed out")]
    Timeout,
}

/// Authenticated account, known once the link is open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name of the account
    #[serde(rename = "pushname")]
    pub display_name: String,
    /// Stable address of the account (e.g. `34600000000@s.whatsapp.net`)
    #[serde(rename = "wid")]
    pub address: String,
}

/// Why a link went down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user signed the device out; never auto-reconnect
    LoggedOut,
    /// Network-level failure
    Network,
    /// The event stream ended without a reason
    ConnectionLost,
    /// Another client took over the session
    Replaced,
    /// Anything a transport reports that we don't classify
    Other(String),
}

impl DisconnectReason {
    /// Parse a transport-reported reason leniently
    ///
    /// Accepts the names used by the socket and browser transports as well
    /// as the numeric close codes the socket transport reports.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace(|c: char| c == '_' || c == ' ', "-");
        match normalized.as_str() {
            "user-logout" | "logout" | "loggedout" | "logged-out" | "401" => Self::LoggedOut,
            "network" | "network-error" | "timedout" | "timed-out" | "408" => Self::Network,
            "connection-lost" | "connectionlost" | "connection-closed" | "428" => {
                Self::ConnectionLost
            }
            "replaced" | "connection-replaced" | "conflict" | "440" => Self::Replaced,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    /// Whether this reason is an explicit sign-out
    pub fn is_logout(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::LoggedOut => "logged-out",
            Self::Network => "network",
            Self::ConnectionLost => "connection-lost",
            Self::Replaced => "replaced",
            Self::Other(reason) => reason,
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound message as the transport reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInbound {
    /// Chat/address the message came from
    pub from: String,
    #[serde(default)]
    pub body: String,
    /// Transport-native type tag (`chat`, `conversation`, `ptt`, `audio`, ...)
    #[serde(rename = "type", default)]
    pub message_type: String,
    /// Server timestamp, seconds since epoch
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub pushname: Option<String>,
    /// Sent by this account (delivery echo)
    #[serde(default)]
    pub from_me: bool,
}

/// Low-level event emitted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A new pairing challenge must be shown to the user
    ChallengeIssued(String),
    /// Credentials accepted, link not fully live yet
    Authenticated,
    /// Link is live
    Open(Identity),
    /// Link dropped
    Closed(DisconnectReason),
    /// Inbound message
    Message(RawInbound),
}

impl TransportEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChallengeIssued(_) => "challenge",
            Self::Authenticated => "authenticated",
            Self::Open(_) => "open",
            Self::Closed(_) => "closed",
            Self::Message(_) => "message",
        }
    }
}

/// Chat summary returned by best-effort listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Message entry returned by best-effort listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub timestamp: i64,
}

/// Capability interface the session drives
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bring the link up; events for this attempt arrive on the returned stream
    async fn connect(&self) -> Result<EventStream, TransportError>;

    /// Send a text body to an already-normalized address
    async fn send(&self, address: &str, body: &str) -> Result<(), TransportError>;

    /// Sign out and release the link
    async fn teardown(&self) -> Result<(), TransportError>;

    /// Domain appended to bare numbers (without the `@`)
    fn address_suffix(&self) -> &str;

    /// Recent chats, if the transport keeps any
    async fn list_chats(&self) -> Result<Vec<ChatSummary>, TransportError> {
        Ok(Vec::new())
    }

    /// Messages of one chat, if the transport keeps any
    async fn list_messages(&self, _chat_id: &str) -> Result<Vec<ChatMessage>, TransportError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reason_parse() {
        assert_eq!(DisconnectReason::parse("user-logout"), DisconnectReason::LoggedOut);
        assert_eq!(DisconnectReason::parse("LOGOUT"), DisconnectReason::LoggedOut);
        assert_eq!(DisconnectReason::parse("loggedOut"), DisconnectReason::LoggedOut);
        assert_eq!(DisconnectReason::parse("401"), DisconnectReason::LoggedOut);
        assert_eq!(DisconnectReason::parse("network"), DisconnectReason::Network);
        assert_eq!(DisconnectReason::parse("440"), DisconnectReason::Replaced);
        assert_eq!(
            DisconnectReason::parse("NAVIGATION"),
            DisconnectReason::Other("NAVIGATION".to_string())
        );
    }

    #[test]
    fn test_only_logout_is_logout() {
        assert!(DisconnectReason::LoggedOut.is_logout());
        assert!(!DisconnectReason::Network.is_logout());
        assert!(!DisconnectReason::Other("user".into()).is_logout());
    }

    #[test]
    fn test_raw_inbound_deserializes_transport_shape() {
        let raw: RawInbound = serde_json::from_str(
            r#"{"from":"34600000000@s.whatsapp.net","body":"Hola","type":"chat","timestamp":1700000000,"pushname":"Ana","fromMe":false}"#,
        )
        .unwrap();
        assert_eq!(raw.message_type, "chat");
        assert_eq!(raw.pushname.as_deref(), Some("Ana"));
        assert!(!raw.from_me);
    }

    #[test]
    fn test_identity_serializes_as_client_info() {
        let identity = Identity {
            display_name: "Clinica".to_string(),
            address: "34600000000@s.whatsapp.net".to_string(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["pushname"], "Clinica");
        assert_eq!(json["wid"], "34600000000@s.whatsapp.net");
    }
}

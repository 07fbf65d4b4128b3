//! Message relay
//!
//! Ferries payloads between the transport and the clinic backend:
//!
//! - inbound: transport event → [`InboundMessage`] → real-time subscribers
//!   and the configured [`InboundSink`] (webhook). Best-effort, at most once.
//! - outbound: [`OutboundSendRequest`] → validated, address-normalized →
//!   transport send primitive. Never retried here; the backend owns retry.

pub mod inbound;
pub mod outbound;
pub mod sink;

pub use inbound::{InboundMessage, InboundRelay, MessageKind};
pub use outbound::{normalize_address, OutboundSendRequest, SendReceipt};
pub use sink::{InboundSink, LogSink, SinkError, WebhookConfig, WebhookSink};

/// Errors surfaced to send callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Session is not READY; retry later
    #[error("session is not ready")]
    NotReady,

    /// Caller input is malformed; never retried
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport took the request but delivery failed
    #[error("send failed: {0}")]
    SendFailed(String),
}

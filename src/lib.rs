//! WhatsApp gateway for the clinic backend
//!
//! Keeps one linked WhatsApp device alive on behalf of a clinic and relays
//! messages between it and the clinic's backend.
//!
//! ## Components
//!
//! - **Session**: lifecycle state machine and the single task that drives it
//! - **Pairing**: renders the transport's challenge as a scannable QR code
//! - **Relay**: inbound messages to the webhook, outbound sends to the transport
//! - **Hub**: real-time push of session events over WebSocket
//! - **Transport**: capability interface; `mock` for demos, `sidecar` for real links

pub mod config;
pub mod hub;
pub mod pairing;
pub mod relay;
pub mod routes;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};

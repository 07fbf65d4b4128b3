//! HTTP routes for the WhatsApp gateway

pub mod events_ws;
pub mod health;
pub mod messages;
pub mod session;
pub mod status;

pub use events_ws::handle_events_ws;
pub use health::{health_check, readiness_check, version_info};
pub use messages::{list_chats, list_messages, send_message};
pub use session::{initialize, logout};
pub use status::{pairing_qr, session_status};

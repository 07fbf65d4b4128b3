//! Session lifecycle
//!
//! - [`machine`] - pure state machine, inputs in, effects out
//! - [`driver`] - the single task that owns the machine and the transport
//! - [`reconnect`] - what to do after a drop
//! - [`status`] - read-only view for pollers

pub mod driver;
pub mod machine;
pub mod reconnect;
pub mod state;
pub mod status;

pub use driver::{SessionDriver, SessionHandle};
pub use machine::{Effect, SessionInput, SessionMachine, Transition};
pub use reconnect::{ReconnectDecision, ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
pub use state::{SessionSnapshot, SessionState, SessionStatus};
pub use status::StatusFacade;

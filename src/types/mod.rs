//! Shared types

pub mod error;

pub use error::{GatewayError, Result};

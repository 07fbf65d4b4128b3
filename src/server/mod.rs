//! HTTP and WebSocket server

pub mod http;

pub use http::{error_response, json_response, read_json, run, serve, AppState, BoxBody};

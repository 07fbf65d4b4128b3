//! Session status and pairing QR
//!
//! Both endpoints read the published snapshot only; they never wait on the
//! session driver, so a UI polling every second costs nothing.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::server::{json_response, AppState};

/// `GET /qr` body
#[derive(Serialize)]
pub struct QrResponse {
    /// `data:image/svg+xml;base64,...`, or null when no challenge is pending
    pub qr: Option<String>,
}

/// GET /status - `{ready, hasQR, info, state}`
pub fn session_status(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &state.session.status())
}

/// GET /qr
pub fn pairing_qr(state: &AppState) -> Response<Full<Bytes>> {
    let qr = state
        .session
        .current_challenge()
        .map(|challenge| challenge.image.clone());
    json_response(StatusCode::OK, &QrResponse { qr })
}

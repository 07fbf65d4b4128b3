//! Session control: sign-out and re-initialize

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::server::{error_response, json_response, AppState};
use crate::session::SessionState;

#[derive(Serialize)]
pub struct SessionActionResponse {
    pub success: bool,
    pub state: SessionState,
}

/// POST /logout - idempotent
pub async fn logout(state: &AppState) -> Response<Full<Bytes>> {
    match state.session.logout().await {
        Ok(()) => json_response(
            StatusCode::OK,
            &SessionActionResponse {
                success: true,
                state: state.session.state(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /initialize - the only way out of LOGGED_OUT
pub async fn initialize(state: &AppState) -> Response<Full<Bytes>> {
    match state.session.initialize().await {
        Ok(session_state) => json_response(
            StatusCode::OK,
            &SessionActionResponse {
                success: true,
                state: session_state,
            },
        ),
        Err(e) => error_response(e),
    }
}

//! Message endpoints
//!
//! - POST /send-message - outbound text, `{number, message}`
//! - GET /chats - recent chats as a bare array (best-effort, transport dependent)
//! - GET /messages/{chatId} - messages of one chat as a bare array (best-effort)

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::relay::OutboundSendRequest;
use crate::server::{error_response, json_response, read_json, AppState};
use crate::types::GatewayError;

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    /// Normalized address the message went to
    pub to: String,
}

/// POST /send-message
///
/// 400 on malformed input, 503 when the session is not READY, 502 when
/// the transport took the message and failed. Never retried here.
pub async fn send_message(state: &AppState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let request: OutboundSendRequest = match read_json(req).await {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    match state.session.send(request).await {
        Ok(receipt) => json_response(
            StatusCode::OK,
            &SendMessageResponse {
                success: true,
                to: receipt.to,
            },
        ),
        Err(e) => {
            let err = GatewayError::from(e);
            if matches!(err, GatewayError::SendFailed(_)) {
                warn!(error = %err, "Send request failed");
            } else {
                info!(error = %err, "Send request rejected");
            }
            error_response(err)
        }
    }
}

/// GET /chats
pub async fn list_chats(state: &AppState) -> Response<Full<Bytes>> {
    match state.session.list_chats().await {
        Ok(chats) => json_response(StatusCode::OK, &chats),
        Err(e) => error_response(e),
    }
}

/// GET /messages/{chatId}
pub async fn list_messages(state: &AppState, raw_chat_id: &str) -> Response<Full<Bytes>> {
    let chat_id = match urlencoding::decode(raw_chat_id) {
        Ok(id) => id.into_owned(),
        Err(_) => {
            return error_response(GatewayError::BadRequest(
                "Chat id is not valid UTF-8".to_string(),
            ))
        }
    };
    if chat_id.is_empty() || chat_id.contains('/') {
        return error_response(GatewayError::BadRequest("Chat id is required".to_string()));
    }

    match state.session.list_messages(&chat_id).await {
        Ok(messages) => json_response(StatusCode::OK, &messages),
        Err(e) => error_response(e),
    }
}

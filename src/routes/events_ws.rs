//! Real-time WebSocket feed of session events
//!
//! ## Protocol
//!
//! Connect: `ws://localhost:3001/ws`
//!
//! Messages (server → client): every [`SessionEvent`] as JSON, plus `pong`.
//! On connect the current QR (if one is pending) and the ready identity
//! (if the session is READY) are replayed, so a UI opened mid-pairing
//! renders immediately instead of waiting for the next challenge.
//!
//! Messages (client → server):
//! - `ping` - Keep-alive ping, answered with `{"type":"pong"}`
//!
//! ## Example Messages
//!
//! ```json
//! {"type": "qr", "data": "data:image/svg+xml;base64,..."}
//! {"type": "ready", "info": {"pushname": "Clinica", "wid": "34600000000@s.whatsapp.net"}}
//! {"type": "pong", "timestamp": "2024-01-15T10:30:00Z"}
//! ```

use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::hub::SessionEvent;
use crate::server::AppState;
use crate::session::{SessionHandle, SessionSnapshot};
use crate::types::GatewayError;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Message received from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive ping
    Ping,
}

/// Events a late subscriber needs to catch up
pub fn replay_events(snapshot: &SessionSnapshot) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    if let Some(ref challenge) = snapshot.challenge {
        events.push(SessionEvent::Qr {
            data: challenge.image.clone(),
        });
    }
    if snapshot.is_ready() {
        if let Some(ref identity) = snapshot.identity {
            events.push(SessionEvent::Ready {
                info: identity.clone(),
            });
        }
    }
    events
}

/// Handle WebSocket upgrade for the session feed
pub async fn handle_events_ws(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok((resp, ws)) => (resp, ws),
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from("WebSocket upgrade failed")))
                .unwrap();
        }
    };

    let session = state.session.clone();
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = handle_events_connection(ws, session).await {
                    warn!("Session feed WebSocket error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

async fn handle_events_connection(
    ws: HyperWebSocket,
    session: SessionHandle,
) -> Result<(), GatewayError> {
    let client_id = Uuid::new_v4();
    let (mut sender, mut receiver) = ws.split();

    // Subscribe before sampling so nothing falls between replay and live
    let mut rx = session.subscribe();
    info!(client = %client_id, "Session feed client connected");

    for event in replay_events(&session.snapshot()) {
        sender.send(WsMessage::Text(serde_json::to_string(&event)?)).await?;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(event) => {
                        let json = serde_json::to_string(&event)?;
                        if sender.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(client = %client_id, skipped, "Session feed client lagging");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(client = %client_id, "Received from feed client: {}", text);
                        if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                            let pong = serde_json::json!({"type": "pong", "timestamp": chrono::Utc::now().to_rfc3339()});
                            let _ = sender.send(WsMessage::Text(pong.to_string())).await;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!(client = %client_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    info!(client = %client_id, "Session feed client disconnected");
    Ok(())
}

//! Sidecar transport
//!
//! Drives an external protocol process (Baileys, whatsapp-web.js, ...)
//! over a local WebSocket. The sidecar owns the wire protocol and the
//! credential store; we only exchange JSON frames with it.
//!
//! ## Frames (sidecar → gateway)
//!
//! ```json
//! {"type": "qr", "data": "2@abc..."}
//! {"type": "authenticated"}
//! {"type": "open", "pushname": "Clinica", "wid": "34600000000@s.whatsapp.net"}
//! {"type": "close", "reason": "401"}
//! {"type": "message", "message": {"from": "...", "body": "...", "type": "chat", ...}}
//! {"type": "result", "id": 7, "ok": true, "data": [...]}
//! ```
//!
//! ## Frames (gateway → sidecar)
//!
//! ```json
//! {"type": "send", "id": 7, "to": "34600000000@s.whatsapp.net", "body": "Hola"}
//! {"type": "logout", "id": 8}
//! {"type": "chats", "id": 9}
//! {"type": "messages", "id": 10, "chat_id": "..."}
//! ```

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{
    ChatMessage, ChatSummary, DisconnectReason, EventStream, Identity, RawInbound, Transport,
    TransportError, TransportEvent, DEFAULT_ADDRESS_SUFFIX,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

type Reply = std::result::Result<serde_json::Value, String>;

/// Sidecar connection configuration
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// WebSocket URL of the sidecar, e.g. `ws://127.0.0.1:3002`
    pub url: String,
    /// How long to wait for a `result` frame
    pub request_timeout: Duration,
    /// Addressing suffix for bare numbers
    pub address_suffix: String,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3002".to_string(),
            request_timeout: Duration::from_secs(30),
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SidecarFrame {
    Qr {
        data: String,
    },
    Authenticated,
    Open {
        #[serde(default)]
        pushname: String,
        wid: String,
    },
    Close {
        #[serde(default)]
        reason: Option<String>,
    },
    Message {
        message: RawInbound,
    },
    Result {
        id: u64,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        data: serde_json::Value,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SidecarRequest<'a> {
    Send { id: u64, to: &'a str, body: &'a str },
    Logout { id: u64 },
    Chats { id: u64 },
    Messages { id: u64, chat_id: &'a str },
}

struct Outbound {
    id: u64,
    frame: String,
    reply: oneshot::Sender<Reply>,
}

struct Link {
    outbound: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

/// Transport backed by an external protocol process
pub struct SidecarTransport {
    config: SidecarConfig,
    link: Mutex<Option<Link>>,
    next_id: AtomicU64,
}

impl SidecarTransport {
    pub fn new(config: SidecarConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one request frame and wait for its `result`
    async fn roundtrip(&self, request: SidecarRequest<'_>, id: u64) -> Result<serde_json::Value, TransportError> {
        let frame = serde_json::to_string(&request)
            .map_err(|e| TransportError::Request(format!("encode failed: {}", e)))?;

        let outbound = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(link) => link.outbound.clone(),
                None => return Err(TransportError::NotConnected),
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        outbound
            .send(Outbound { id, frame, reply: reply_tx })
            .await
            .map_err(|_| TransportError::NotConnected)?;

        match timeout(self.config.request_timeout, reply_rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(reason))) => Err(TransportError::Request(reason)),
            Ok(Err(_)) => Err(TransportError::NotConnected),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(&self) -> Result<EventStream, TransportError> {
        info!(url = %self.config.url, "Connecting to WhatsApp sidecar");

        let (ws, _) = timeout(self.config.request_timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| TransportError::Connect("WebSocket connect timed out".to_string()))?
            .map_err(|e| TransportError::Connect(format!("WebSocket connect failed: {}", e)))?;
        let (sink, source) = ws.split();

        let (events_tx, events_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let task = tokio::spawn(run_link(sink, source, outbound_rx, events_tx));

        if let Some(previous) = self.link.lock().await.replace(Link { outbound: outbound_tx, task }) {
            debug!("Replacing previous sidecar link");
            previous.task.abort();
        }

        info!("Connected to WhatsApp sidecar");
        Ok(events_rx)
    }

    async fn send(&self, address: &str, body: &str) -> Result<(), TransportError> {
        let id = self.next_id();
        self.roundtrip(SidecarRequest::Send { id, to: address, body }, id)
            .await
            .map(|_| ())
    }

    async fn teardown(&self) -> Result<(), TransportError> {
        let id = self.next_id();
        let logout = self.roundtrip(SidecarRequest::Logout { id }, id).await;
        if let Err(ref e) = logout {
            warn!(error = %e, "Sidecar logout request failed, dropping link anyway");
        }

        if let Some(link) = self.link.lock().await.take() {
            link.task.abort();
        }

        match logout {
            Err(TransportError::NotConnected) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    fn address_suffix(&self) -> &str {
        &self.config.address_suffix
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, TransportError> {
        let id = self.next_id();
        let data = self.roundtrip(SidecarRequest::Chats { id }, id).await?;
        decode_listing(data)
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, TransportError> {
        let id = self.next_id();
        let data = self.roundtrip(SidecarRequest::Messages { id, chat_id }, id).await?;
        decode_listing(data)
    }
}

fn decode_listing<T: serde::de::DeserializeOwned>(
    data: serde_json::Value,
) -> Result<Vec<T>, TransportError> {
    if data.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(data)
        .map_err(|e| TransportError::Request(format!("unexpected listing shape: {}", e)))
}

/// Translate a sidecar frame into a transport event
fn frame_to_event(frame: SidecarFrame) -> Option<TransportEvent> {
    match frame {
        SidecarFrame::Qr { data } => Some(TransportEvent::ChallengeIssued(data)),
        SidecarFrame::Authenticated => Some(TransportEvent::Authenticated),
        SidecarFrame::Open { pushname, wid } => Some(TransportEvent::Open(Identity {
            display_name: pushname,
            address: wid,
        })),
        SidecarFrame::Close { reason } => Some(TransportEvent::Closed(
            reason
                .as_deref()
                .map(DisconnectReason::parse)
                .unwrap_or(DisconnectReason::ConnectionLost),
        )),
        SidecarFrame::Message { message } => Some(TransportEvent::Message(message)),
        SidecarFrame::Result { .. } => None,
    }
}

/// Register a request awaiting its `result`, dropping entries whose
/// caller already gave up (timed out or aborted)
fn track_pending(pending: &mut HashMap<u64, oneshot::Sender<Reply>>, id: u64, reply: oneshot::Sender<Reply>) {
    pending.retain(|_, tx| !tx.is_closed());
    pending.insert(id, reply);
}

/// Pump frames between the sidecar socket, pending requests and the event stream
async fn run_link(
    mut sink: WsSink,
    mut source: WsSource,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut pending: HashMap<u64, oneshot::Sender<Reply>> = HashMap::new();

    loop {
        tokio::select! {
            request = outbound.recv() => {
                let Some(Outbound { id, frame, reply }) = request else {
                    break;
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    error!(error = %e, "Failed to write to sidecar");
                    let _ = reply.send(Err(format!("sidecar write failed: {}", e)));
                    break;
                }
                track_pending(&mut pending, id, reply);
            }

            msg = source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<SidecarFrame>(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(error = %e, "Ignoring unrecognized sidecar frame");
                                continue;
                            }
                        };

                        if let SidecarFrame::Result { id, ok, error, data } = frame {
                            match pending.remove(&id) {
                                Some(reply) => {
                                    let result = if ok {
                                        Ok(data)
                                    } else {
                                        Err(error.unwrap_or_else(|| "unknown sidecar error".to_string()))
                                    };
                                    let _ = reply.send(result);
                                }
                                None => debug!(id, "Result for unknown or expired request"),
                            }
                            continue;
                        }

                        if let Some(event) = frame_to_event(frame) {
                            debug!(kind = event.kind(), "Sidecar event");
                            if events.send(event).await.is_err() {
                                debug!("Event stream dropped, closing sidecar link");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Sidecar closed connection: {:?}", frame);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Sidecar WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    // Dropping `pending` fails every outstanding request with NotConnected
    debug!(outstanding = pending.len(), "Sidecar link closed");
}

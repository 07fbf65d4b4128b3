//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every route is a
//! thin adapter over the session handle; nothing here holds session state.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::routes;
use crate::session::SessionHandle;
use crate::types::GatewayError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest request body accepted
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Entry point to the single WhatsApp session
    pub session: SessionHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, session: SessionHandle) -> Self {
        Self {
            args,
            session,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(state.args.listen).await?;
    serve(listener, state).await
}

/// Serve connections from an already-bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), GatewayError> {
    info!(
        "WhatsApp gateway listening on {} as node {}",
        listener.local_addr()?,
        state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe - 200 whenever the process is up
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - 200 only with a READY session
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        (Method::GET, "/version") => routes::version_info(),

        (Method::GET, "/status") => routes::session_status(&state),
        (Method::GET, "/qr") => routes::pairing_qr(&state),

        (Method::POST, "/send-message") => routes::send_message(&state, req).await,
        (Method::GET, "/chats") => routes::list_chats(&state).await,
        (Method::GET, p) if p.starts_with("/messages/") => {
            routes::list_messages(&state, &p["/messages/".len()..]).await
        }

        (Method::POST, "/logout") => routes::logout(&state).await,
        (Method::POST, "/initialize") => routes::initialize(&state).await,

        // Real-time push channel
        (Method::GET, "/ws") => {
            if hyper_tungstenite::is_upgrade_request(&req) {
                routes::handle_events_ws(Arc::clone(&state), req).await
            } else {
                bad_request_response("WebSocket upgrade required for /ws")
            }
        }

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        _ => not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Read a JSON request body, capped at [`MAX_BODY_BYTES`]
pub async fn read_json<T, B>(req: Request<B>) -> Result<T, GatewayError>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                GatewayError::PayloadTooLarge(MAX_BODY_BYTES)
            } else {
                GatewayError::BadRequest(format!("Failed to read body: {}", e))
            }
        })?
        .to_bytes();

    if body.is_empty() {
        return Err(GatewayError::BadRequest("Request body is required".into()));
    }
    Ok(serde_json::from_slice(&body)?)
}

/// JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"success":false,"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Cache-Control", "no-store")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Error response carrying `{success: false, code, error}`
pub fn error_response(err: GatewayError) -> Response<Full<Bytes>> {
    let (status, body) = err.into_status_code_and_body();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "success": false,
        "error": "Not Found",
        "path": path,
    });
    json_response(StatusCode::NOT_FOUND, &body)
}

/// Bad request response
fn bad_request_response(message: &str) -> Response<Full<Bytes>> {
    error_response(GatewayError::BadRequest(message.to_string()))
}

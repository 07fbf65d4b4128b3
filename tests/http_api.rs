//! HTTP surface against a running server with the mock transport

use clap::Parser;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use whatsapp_gateway::config::Args;
use whatsapp_gateway::hub::EventHub;
use whatsapp_gateway::server::{self, AppState};
use whatsapp_gateway::session::{SessionDriver, SessionHandle, SessionState};

async fn start(extra: &[&str]) -> (SocketAddr, SessionHandle) {
    let mut argv = vec!["whatsapp-gateway", "--transport", "mock"];
    argv.extend_from_slice(extra);
    let args = Args::try_parse_from(argv).unwrap();

    let (session, _driver) = SessionDriver::spawn(
        args.build_transport().unwrap(),
        args.build_sink().unwrap(),
        Arc::new(EventHub::new()),
        args.reconnect_policy(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(args, session.clone()));
    tokio::spawn(server::serve(listener, state));

    (addr, session)
}

async fn wait_for(session: &SessionHandle, state: SessionState) {
    let mut rx = session.facade().watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        while rx.borrow_and_update().state != state {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

async fn get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let response = reqwest::get(format!("http://{}{}", addr, path)).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

async fn post(addr: SocketAddr, path: &str, body: &str) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{}{}", addr, path))
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn pairing_status_and_qr() {
    let (addr, session) = start(&[]).await;
    wait_for(&session, SessionState::AwaitingPairing).await;

    let (status, body) = get(addr, "/status").await;
    assert_eq!(status, 200);
    assert_eq!(body["ready"], false);
    assert_eq!(body["hasQR"], true);
    assert_eq!(body["state"], "AWAITING_PAIRING");
    assert!(body["info"].is_null());

    let (status, body) = get(addr, "/qr").await;
    assert_eq!(status, 200);
    assert!(body["qr"]
        .as_str()
        .unwrap()
        .starts_with("data:image/svg+xml;base64,"));
}

#[tokio::test]
async fn send_message_errors() {
    let (addr, session) = start(&[]).await;
    wait_for(&session, SessionState::AwaitingPairing).await;

    let (status, body) = post(addr, "/send-message", r#"{"number":"34600000000","message":"Hola"}"#).await;
    assert_eq!(status, 503);
    assert_eq!(body["code"], "NOT_READY");

    let (status, body) = post(addr, "/send-message", r#"{"message":"Hola"}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, _) = post(addr, "/send-message", "not json").await;
    assert_eq!(status, 400);

    let (status, _) = get(addr, "/chats").await;
    assert_eq!(status, 503);

    let (status, body) = post(addr, "/send-message", r#"{"number":"+","message":"Hola"}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn ready_session_sends_and_lists() {
    let (addr, session) = start(&["--mock-auto-pair-ms", "10"]).await;
    wait_for(&session, SessionState::Ready).await;

    let (status, _) = get(addr, "/readyz").await;
    assert_eq!(status, 200);

    let (status, body) = post(addr, "/send-message", r#"{"number":"+34 600 000 000","message":"Hola"}"#).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["to"], "34600000000@s.whatsapp.net");

    let (status, body) = get(addr, "/chats").await;
    assert_eq!(status, 200);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = get(addr, "/messages/34600000000%40s.whatsapp.net").await;
    assert_eq!(status, 200);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn logout_then_initialize() {
    let (addr, session) = start(&["--mock-auto-pair-ms", "10"]).await;
    wait_for(&session, SessionState::Ready).await;

    let (status, body) = post(addr, "/logout", "").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["state"], "LOGGED_OUT");

    let (status, _) = get(addr, "/ready").await;
    assert_eq!(status, 503);
    let (status, body) = get(addr, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["healthy"], true);

    let (status, body) = post(addr, "/initialize", "").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    wait_for(&session, SessionState::AwaitingPairing).await;
}

#[tokio::test]
async fn preflight_and_unknown_route() {
    let (addr, _session) = start(&[]).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("http://{}/send-message", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let (status, _) = get(addr, "/nope").await;
    assert_eq!(status, 404);
}

//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - Liveness probe (is the process running?)
//! - /ready, /readyz - Readiness probe (can messages be sent right now?)
//!
//! Liveness never looks at the WhatsApp link: a phone that has not scanned
//! the QR yet is not a reason to restart the pod. Readiness is the session
//! being READY.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::{json_response, AppState};
use crate::session::SessionState;

/// Health response for probes and the clinic dashboard
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    /// 'online' when the session is READY, 'pairing' while waiting on a
    /// scan, 'degraded' otherwise
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub timestamp: String,
    pub node_id: String,
    /// Transport in use (mock or sidecar)
    pub transport: &'static str,
    pub session: SessionHealth,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHealth {
    pub state: SessionState,
    pub ready: bool,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
    /// Real-time subscribers currently attached
    pub subscribers: usize,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let snapshot = state.session.snapshot();

    let status = match snapshot.state {
        SessionState::Ready => "online",
        SessionState::AwaitingPairing => "pairing",
        _ => "degraded",
    };

    HealthResponse {
        healthy: true,
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        node_id: state.args.node_id.to_string(),
        transport: state.args.transport.as_str(),
        session: SessionHealth {
            state: snapshot.state,
            ready: snapshot.is_ready(),
            has_qr: snapshot.challenge.is_some(),
            subscribers: state.session.hub().subscriber_count(),
        },
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

/// Handle readiness probe (/ready, /readyz)
///
/// Returns 200 only if a send would be attempted right now.
pub fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = build_health_response(&state);
    let status = if response.session.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    /// Build timestamp
    pub build_time: &'static str,
    /// Service name
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "whatsapp-gateway",
    };
    json_response(StatusCode::OK, &response)
}

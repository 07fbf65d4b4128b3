//! Pairing challenge publisher
//!
//! Turns the raw challenge string a transport hands us into a scannable
//! QR code (SVG, base64 data URI) and keeps exactly one of them. A new
//! challenge always replaces the old one; nothing is queued and nothing
//! is persisted. Subscribers are pushed the image as soon as it exists,
//! since the underlying token typically expires in under a minute.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::QrCode;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::hub::{EventHub, SessionEvent};

/// Minimum rendered size in pixels; phones scan this comfortably
const QR_MIN_DIMENSION: u32 = 264;

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("challenge cannot be encoded as a QR code: {0}")]
    Encode(String),
}

/// A live challenge and its rendered image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingChallenge {
    /// Opaque token from the transport
    #[serde(skip)]
    pub raw: String,
    /// `data:image/svg+xml;base64,...`
    pub image: String,
    pub issued_at: DateTime<Utc>,
}

impl PairingChallenge {
    pub fn render(raw: &str) -> Result<Self, PairingError> {
        Ok(Self {
            raw: raw.to_string(),
            image: render_data_uri(raw)?,
            issued_at: Utc::now(),
        })
    }
}

/// Render `payload` as an SVG QR code wrapped in a data URI
pub fn render_data_uri(payload: &str) -> Result<String, PairingError> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| PairingError::Encode(e.to_string()))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .quiet_zone(true)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", BASE64.encode(image)))
}

/// Single-slot holder for the current challenge
pub struct PairingPublisher {
    current: Option<Arc<PairingChallenge>>,
    hub: Arc<EventHub>,
}

impl PairingPublisher {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { current: None, hub }
    }

    /// Render, store (replacing any previous challenge) and push to subscribers
    ///
    /// On a render failure the slot is emptied: a stale image must never
    /// outlive the challenge that superseded it.
    pub fn on_challenge_issued(&mut self, raw: &str) -> Result<Arc<PairingChallenge>, PairingError> {
        let challenge = match PairingChallenge::render(raw) {
            Ok(challenge) => Arc::new(challenge),
            Err(e) => {
                self.current = None;
                return Err(e);
            }
        };

        if self.current.replace(Arc::clone(&challenge)).is_some() {
            debug!("Pairing challenge superseded");
        }
        info!("New pairing challenge published");

        self.hub.broadcast(SessionEvent::Qr {
            data: challenge.image.clone(),
        });
        Ok(challenge)
    }

    pub fn current(&self) -> Option<Arc<PairingChallenge>> {
        self.current.clone()
    }

    pub fn clear(&mut self) {
        if self.current.take().is_some() {
            debug!("Pairing challenge cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(uri: &str) -> String {
        let encoded = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_render_produces_svg_data_uri() {
        let uri = render_data_uri("whatsapp://connect?code=abc123").unwrap();
        assert!(uri.starts_with("data:image/svg+xml;base64,"));
        assert!(decode(&uri).contains("<svg"));
    }

    #[test]
    fn test_different_payloads_render_differently() {
        assert_ne!(render_data_uri("XYZ").unwrap(), render_data_uri("XYZ2").unwrap());
    }

    #[test]
    fn test_oversized_payload_fails() {
        let huge = "x".repeat(8000);
        assert!(matches!(render_data_uri(&huge), Err(PairingError::Encode(_))));
    }

    #[test]
    fn test_only_latest_challenge_is_current() {
        let mut publisher = PairingPublisher::new(Arc::new(EventHub::new()));
        for raw in ["first", "second", "third"] {
            publisher.on_challenge_issued(raw).unwrap();
            assert_eq!(publisher.current().unwrap().raw, raw);
        }
    }

    #[test]
    fn test_failed_render_clears_previous() {
        let mut publisher = PairingPublisher::new(Arc::new(EventHub::new()));
        publisher.on_challenge_issued("first").unwrap();
        assert!(publisher.on_challenge_issued(&"x".repeat(8000)).is_err());
        assert!(publisher.current().is_none());
    }

    #[tokio::test]
    async fn test_issue_pushes_to_subscribers() {
        let hub = Arc::new(EventHub::new());
        let mut rx = hub.subscribe();
        let mut publisher = PairingPublisher::new(Arc::clone(&hub));

        let challenge = publisher.on_challenge_issued("XYZ").unwrap();
        match rx.recv().await.unwrap() {
            SessionEvent::Qr { data } => assert_eq!(data, challenge.image),
            other => panic!("expected qr event, got {:?}", other),
        }
    }

    #[test]
    fn test_clear() {
        let mut publisher = PairingPublisher::new(Arc::new(EventHub::new()));
        publisher.on_challenge_issued("XYZ").unwrap();
        publisher.clear();
        assert!(publisher.current().is_none());
    }
}

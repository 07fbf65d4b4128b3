//! Demo transport
//!
//! Stands in for a real WhatsApp link so the clinic UI can be exercised
//! end to end: every connect issues a fresh `whatsapp://connect?code=...`
//! challenge, sends are logged and acknowledged. With `auto_pair_after`
//! set, the mock pretends the QR was scanned and opens the link.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::{
    EventStream, Identity, Transport, TransportError, TransportEvent, DEFAULT_ADDRESS_SUFFIX,
};

/// Mock transport configuration
#[derive(Debug, Clone)]
pub struct MockTransportConfig {
    /// Simulate a scan this long after the challenge is issued
    pub auto_pair_after: Option<Duration>,
    /// Identity reported when the simulated link opens
    pub identity: Identity,
    /// Addressing suffix for bare numbers
    pub address_suffix: String,
}

impl Default for MockTransportConfig {
    fn default() -> Self {
        Self {
            auto_pair_after: None,
            identity: Identity {
                display_name: "Clinic (mock)".to_string(),
                address: format!("34000000000@{}", DEFAULT_ADDRESS_SUFFIX),
            },
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_string(),
        }
    }
}

/// Transport that never leaves the process
pub struct MockTransport {
    config: MockTransportConfig,
    /// Sender for the current attempt; dropping it ends the event stream
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    open: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(config: MockTransportConfig) -> Self {
        Self {
            config,
            events: Mutex::new(None),
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the simulated link is open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(MockTransportConfig::default())
    }
}

fn pairing_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<EventStream, TransportError> {
        let (tx, rx) = mpsc::channel(32);
        self.open.store(false, Ordering::Relaxed);

        let challenge = format!("whatsapp://connect?code={}", pairing_code());
        info!("Mock transport issuing pairing challenge");
        tx.send(TransportEvent::ChallengeIssued(challenge))
            .await
            .map_err(|_| TransportError::Connect("event stream dropped".into()))?;

        if let Some(delay) = self.config.auto_pair_after {
            let pair_tx = tx.clone();
            let identity = self.config.identity.clone();
            let open = Arc::clone(&self.open);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                debug!("Mock transport simulating scan");
                if pair_tx.send(TransportEvent::Authenticated).await.is_err() {
                    return;
                }
                open.store(true, Ordering::Relaxed);
                let _ = pair_tx.send(TransportEvent::Open(identity)).await;
            });
        }

        *self.events.lock().await = Some(tx);
        Ok(rx)
    }

    async fn send(&self, address: &str, body: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        info!(to = %address, chars = body.chars().count(), "[MOCK] Sending message");
        Ok(())
    }

    async fn teardown(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Relaxed);
        self.events.lock().await.take();
        info!("Mock transport torn down");
        Ok(())
    }

    fn address_suffix(&self) -> &str {
        &self.config.address_suffix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_issues_challenge() {
        let transport = MockTransport::default();
        let mut events = transport.connect().await.unwrap();

        match events.recv().await {
            Some(TransportEvent::ChallengeIssued(challenge)) => {
                assert!(challenge.starts_with("whatsapp://connect?code="));
                assert_eq!(challenge.len(), "whatsapp://connect?code=".len() + 8);
            }
            other => panic!("expected challenge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_requires_open_link() {
        let transport = MockTransport::default();
        let _events = transport.connect().await.unwrap();
        assert!(matches!(
            transport.send("1@s.whatsapp.net", "hi").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_pair_opens_link() {
        let transport = MockTransport::new(MockTransportConfig {
            auto_pair_after: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let mut events = transport.connect().await.unwrap();

        assert!(matches!(events.recv().await, Some(TransportEvent::ChallengeIssued(_))));
        assert_eq!(events.recv().await, Some(TransportEvent::Authenticated));
        assert!(matches!(events.recv().await, Some(TransportEvent::Open(_))));
        assert!(transport.is_open());
        assert!(transport.send("1@s.whatsapp.net", "hi").await.is_ok());
    }

    #[tokio::test]
    async fn test_teardown_ends_stream() {
        let transport = MockTransport::default();
        let mut events = transport.connect().await.unwrap();
        let _ = events.recv().await;

        transport.teardown().await.unwrap();
        assert!(events.recv().await.is_none());
    }
}

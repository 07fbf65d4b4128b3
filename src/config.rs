//! Configuration for the WhatsApp gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::relay::{InboundSink, LogSink, WebhookConfig, WebhookSink};
use crate::session::ReconnectPolicy;
use crate::transport::{
    Identity, MockTransport, MockTransportConfig, SidecarConfig, SidecarTransport, Transport,
    DEFAULT_ADDRESS_SUFFIX,
};
use crate::types::{GatewayError, Result};

/// Which transport carries the WhatsApp link
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// In-process demo transport; sends are logged, nothing leaves the host
    Mock,
    /// External protocol process reached over WebSocket
    Sidecar,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Sidecar => "sidecar",
        }
    }
}

/// WhatsApp gateway - one linked device, relayed to the clinic backend
#[derive(Parser, Debug, Clone)]
#[command(name = "whatsapp-gateway")]
#[command(about = "WhatsApp session gateway: pairing, message relay and reconnection")]
pub struct Args {
    /// Unique identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3001")]
    pub listen: SocketAddr,

    /// Transport implementation
    #[arg(long, env = "TRANSPORT", value_enum, default_value = "mock")]
    pub transport: TransportKind,

    /// Sidecar WebSocket URL (required with TRANSPORT=sidecar)
    #[arg(long, env = "SIDECAR_URL")]
    pub sidecar_url: Option<String>,

    /// Timeout for requests answered by the sidecar, in milliseconds
    #[arg(long, env = "SIDECAR_REQUEST_TIMEOUT_MS", default_value = "15000")]
    pub sidecar_request_timeout_ms: u64,

    /// Domain appended to bare phone numbers
    #[arg(long, env = "ADDRESS_SUFFIX", default_value = DEFAULT_ADDRESS_SUFFIX)]
    pub address_suffix: String,

    /// Clinic backend endpoint receiving inbound messages
    /// If unset, inbound messages are only logged and pushed over /ws
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Webhook request timeout in milliseconds
    #[arg(long, env = "WEBHOOK_TIMEOUT_MS", default_value = "10000")]
    pub webhook_timeout_ms: u64,

    /// Pause before re-dialing after a dropped link, in milliseconds
    #[arg(long, env = "RECONNECT_DELAY_MS", default_value = "3000")]
    pub reconnect_delay_ms: u64,

    /// Mock transport: simulate a QR scan after this many milliseconds
    #[arg(long, env = "MOCK_AUTO_PAIR_MS")]
    pub mock_auto_pair_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.transport == TransportKind::Sidecar
            && self.sidecar_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err("SIDECAR_URL is required when TRANSPORT=sidecar".to_string());
        }

        if self.reconnect_delay_ms == 0 {
            return Err("RECONNECT_DELAY_MS must be greater than zero".to_string());
        }

        if self.address_suffix.trim().trim_start_matches('@').is_empty() {
            return Err("ADDRESS_SUFFIX must not be empty".to_string());
        }

        if let Some(ref url) = self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("WEBHOOK_URL must be an http(s) URL".to_string());
            }
        }

        Ok(())
    }

    /// Suffix without a leading `@`
    pub fn address_suffix(&self) -> &str {
        self.address_suffix.trim().trim_start_matches('@')
    }

    /// Whether log lines are emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(self.reconnect_delay_ms))
    }

    /// Build the configured transport
    pub fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        match self.transport {
            TransportKind::Mock => {
                let config = MockTransportConfig {
                    auto_pair_after: self.mock_auto_pair_ms.map(Duration::from_millis),
                    identity: Identity {
                        display_name: "Clinic (mock)".to_string(),
                        address: format!("34000000000@{}", self.address_suffix()),
                    },
                    address_suffix: self.address_suffix().to_string(),
                };
                Ok(Arc::new(MockTransport::new(config)))
            }
            TransportKind::Sidecar => {
                let url = self
                    .sidecar_url
                    .clone()
                    .ok_or_else(|| GatewayError::Config("SIDECAR_URL is not set".into()))?;
                Ok(Arc::new(SidecarTransport::new(SidecarConfig {
                    url,
                    request_timeout: Duration::from_millis(self.sidecar_request_timeout_ms),
                    address_suffix: self.address_suffix().to_string(),
                })))
            }
        }
    }

    /// Build the inbound sink: the webhook if configured, otherwise logging only
    pub fn build_sink(&self) -> Result<Arc<dyn InboundSink>> {
        match self.webhook_url {
            Some(ref url) => {
                let sink = WebhookSink::new(WebhookConfig {
                    url: url.clone(),
                    timeout: Duration::from_millis(self.webhook_timeout_ms),
                })
                .map_err(|e| GatewayError::Config(e.to_string()))?;
                Ok(Arc::new(sink))
            }
            None => Ok(Arc::new(LogSink)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["whatsapp-gateway"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.listen.port(), 3001);
        assert_eq!(args.transport, TransportKind::Mock);
        assert_eq!(args.address_suffix(), "s.whatsapp.net");
        assert_eq!(args.reconnect_policy().delay(), Duration::from_secs(3));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_sidecar_requires_url() {
        let args = parse(&["--transport", "sidecar"]);
        assert!(args.validate().is_err());

        let args = parse(&["--transport", "sidecar", "--sidecar-url", "ws://127.0.0.1:3002"]);
        assert!(args.validate().is_ok());
        assert!(args.build_transport().is_ok());
    }

    #[test]
    fn test_rejects_zero_delay_and_empty_suffix() {
        assert!(parse(&["--reconnect-delay-ms", "0"]).validate().is_err());
        assert!(parse(&["--address-suffix", "@"]).validate().is_err());
    }

    #[test]
    fn test_suffix_leading_at_is_trimmed() {
        let args = parse(&["--address-suffix", "@c.us"]);
        assert_eq!(args.address_suffix(), "c.us");
    }

    #[test]
    fn test_webhook_must_be_http() {
        assert!(parse(&["--webhook-url", "ftp://clinic"]).validate().is_err());
        let args = parse(&["--webhook-url", "http://localhost:8000/api/whatsapp/webhook"]);
        assert!(args.validate().is_ok());
        assert!(args.build_sink().is_ok());
    }
}

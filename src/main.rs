//! WhatsApp gateway - one linked device, relayed to the clinic backend

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whatsapp_gateway::{
    config::{Args, TransportKind},
    hub::EventHub,
    server,
    session::SessionDriver,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("whatsapp_gateway={},info", args.log_level).into());
    if args.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  WhatsApp Gateway");
    info!("  pairing, relay and reconnection");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Transport: {}", args.transport.as_str());
    if let Some(ref url) = args.sidecar_url {
        info!("Sidecar: {}", url);
    }
    info!("Address suffix: @{}", args.address_suffix());
    match args.webhook_url {
        Some(ref url) => info!("Webhook: {}", url),
        None => warn!("Webhook: not configured, inbound messages are only logged"),
    }
    info!("Reconnect delay: {} ms", args.reconnect_delay_ms);
    info!("======================================");

    if args.transport == TransportKind::Mock {
        warn!("Mock transport in use - no message leaves this process");
    }

    let transport = args.build_transport()?;
    let sink = args.build_sink()?;
    let hub = Arc::new(EventHub::new());

    let (session, driver) = SessionDriver::spawn(transport, sink, hub, args.reconnect_policy());
    let state = Arc::new(server::AppState::new(args, session));

    tokio::select! {
        result = server::run(state) => {
            if let Err(e) = result {
                error!("Server error: {:?}", e);
                std::process::exit(1);
            }
        }
        _ = driver => {
            error!("Session driver exited unexpectedly");
            std::process::exit(1);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

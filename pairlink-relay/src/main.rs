//! `Pairlink` relay server: pairs two peers per room and forwards their
//! handshake messages.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:3000
//! cargo run --bin pairlink-relay
//!
//! # Run on custom address
//! cargo run --bin pairlink-relay -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! PAIRLINK_RELAY_ADDR=127.0.0.1:8080 cargo run --bin pairlink-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use pairlink_relay::config::{RelayCliArgs, RelayConfig};
use pairlink_relay::relay::{self, RelayState};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting pairlink relay");

    let state = Arc::new(RelayState::with_config(config.max_message_size));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "signaling relay listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}

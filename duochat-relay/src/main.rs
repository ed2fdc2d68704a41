//! `DuoChat` relay server -- realtime directed-message relay.
//!
//! An axum server carrying both the HTTP auth/upload surface and the
//! WebSocket relay. Messages are persisted before delivery; recipients
//! that are offline accrue unread counters instead of live frames.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:5000
//! cargo run --bin duochat-relay
//!
//! # Run on custom address with a stable token secret
//! cargo run --bin duochat-relay -- --bind 127.0.0.1:8080 --jwt-secret swordfish
//!
//! # Or via environment variables
//! DUOCHAT_ADDR=127.0.0.1:8080 cargo run --bin duochat-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use duochat_relay::config::{RelayCliArgs, RelayConfig};
use duochat_relay::relay::{self, RelayState};
use duochat_relay::store::InMemoryMessageStore;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting duochat relay server");
    if config.jwt_secret.is_none() {
        tracing::warn!("no jwt secret configured, tokens will not survive a restart");
    }

    let state = Arc::new(RelayState::with_config(
        &config,
        InMemoryMessageStore::new(),
    ));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
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

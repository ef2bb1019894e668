// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Venue Map Server
//!
//! Restaurant discovery around a point, enriched from several review services.

use anyhow::Result;
use api::{Server, ServerConfig, ShutdownConfig};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting venue map server with coordinated shutdown support");

    let config = ServerConfig::from_env()?;
    info!(
        environment = %config.environment,
        places = %config.places.base_url,
        proxy = %config.proxy_url,
        snapshot = ?config.snapshot_path,
        "configuration loaded"
    );
    if config.snapshot_path.is_none() {
        warn!("no snapshot_path configured, favorites will not survive a restart");
    }

    let shutdown_config = ShutdownConfig::default();

    let server = Server::new(config, shutdown_config).await?;

    // NOTE: the `#[tokio::main]` task does not run a worker future, we must spawn
    tokio::spawn(async move { server.run().await }).await??;

    Ok(())
}

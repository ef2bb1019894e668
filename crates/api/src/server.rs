// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the main server struct and implementation for the venue map server,
//! including server lifecycle management, router configuration, and coordinated graceful
//! shutdown using `CancellationToken`.

use std::{net::SocketAddr, time::Duration};

use api_client::EdgeProxy;
use axum::{Router, http::HeaderName};
use external_apis::{EnrichmentClient, PlacesClient};
use hyper::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn};
use venue_core::{CoreError, FileSnapshotStore, Orchestrator, SnapshotWriter};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    routes::create_routes,
    state::ServerState,
};

// Server constants
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight HTTP requests after the shutdown signal
    pub graceful_timeout: Duration,
    /// Maximum time to wait for upstream calls and the final snapshot
    pub force_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
            force_timeout: Duration::from_secs(DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Build the orchestrator described by `config` and restore the saved session
///
/// # Errors
///
/// Returns `ServerError::Config` if a client cannot be created, or a core
/// error if the session snapshot exists but cannot be read.
pub async fn build_orchestrator(config: &ServerConfig) -> ServerResult<Orchestrator> {
    let config_error = |message: String| ServerError::Config { message };

    let places = PlacesClient::new(config.places.client_config())
        .map_err(|e| config_error(format!("places client: {e}")))?;
    let proxy = EdgeProxy::new(&config.proxy_url).map_err(CoreError::from)?;
    let enrichment = EnrichmentClient::new(proxy)
        .map_err(|e| config_error(format!("enrichment client: {e}")))?;

    let mut builder = Orchestrator::builder(config.discovery.clone(), places, enrichment)
        .services(config.service_registry()?);

    let mut saved = None;
    if let Some(path) = &config.snapshot_path {
        let store = FileSnapshotStore::new(path.clone());
        saved = store.load().await?;
        builder = builder.snapshots(SnapshotWriter::new(
            store,
            config.discovery.persist_interval(),
        ));
    }

    let orchestrator = builder.build()?;
    if let Some(snapshot) = saved {
        orchestrator.restore(&snapshot);
    }
    Ok(orchestrator)
}

/// Main server struct
#[derive(Debug)]
pub struct Server {
    /// Server configuration
    config: ServerConfig,
    /// Application router
    router: Router,
    /// Server state
    state: ServerState,
    /// Cancellation token for coordinated shutdown
    cancellation_token: CancellationToken,
    /// Configuration for coordinated shutdown
    graceful_shutdown_config: ShutdownConfig,
}

impl Server {
    /// Create new server instance
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid.
    pub async fn new(config: ServerConfig, shutdown_config: ShutdownConfig) -> ServerResult<Self> {
        let orchestrator = build_orchestrator(&config).await?;
        Ok(Self::with_orchestrator(config, shutdown_config, orchestrator))
    }

    /// Create server with a prepared orchestrator for dependency injection
    pub fn with_orchestrator(
        config: ServerConfig,
        graceful_shutdown_config: ShutdownConfig,
        orchestrator: Orchestrator,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let state = ServerState::new(
            config.clone(),
            orchestrator,
            cancellation_token.child_token(),
        );
        let router = Self::create_router(state.clone());

        Self {
            config,
            router,
            state,
            cancellation_token,
            graceful_shutdown_config,
        }
    }

    /// Create application router with middleware
    fn create_router(state: ServerState) -> Router {
        let timeout_duration = state.config().timeout_seconds.value();

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                        info_span!("http_request", ?request_id)
                    } else {
                        tracing::error!("failed to extract id from request");
                        info_span!("http_request", request_id = "unknown")
                    }
                }),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(timeout_duration));

        create_routes().layer(middleware).with_state(state)
    }

    /// Run the server with coordinated graceful shutdown
    ///
    /// Once HTTP traffic has drained, pagination stops, running upstream calls
    /// are given `force_timeout` to finish and the session is written out.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// `ServerError::Startup` if the server fails to start, or
    /// `ServerError::Timeout` if draining exceeds the shutdown limits.
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        info!(
            address = %actual_addr,
            environment = %self.config.environment,
            services = ?self.state.orchestrator().services().client_names(),
            "venue map server starting",
        );

        let cancellation_token = self.cancellation_token.clone();
        let shutdown_token = cancellation_token.clone();
        tokio::spawn(async move {
            info!("spawning the graceful shutdown task");
            Self::shutdown_signal_handler(shutdown_token).await;
        });

        let ShutdownConfig {
            graceful_timeout,
            force_timeout,
        } = self.graceful_shutdown_config;

        let serve = axum::serve(listener, self.router).with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            info!("no longer accepting connections");
        });
        let serve = tokio::spawn(async move { serve.await });

        // The drain deadline only starts once shutdown was requested
        let server_result = tokio::select! {
            result = serve => result?,
            () = async {
                self.cancellation_token.cancelled().await;
                tokio::time::sleep(graceful_timeout).await;
            } => {
                warn!(?graceful_timeout, "HTTP connections did not drain in time");
                Ok(())
            }
        };

        if let Err(e) = server_result {
            error!(error = ?e, "Server error during shutdown");
            return Err(ServerError::Shutdown { source: e });
        }

        let orchestrator = self.state.orchestrator().clone();
        match tokio::time::timeout(force_timeout, orchestrator.shutdown()).await {
            Ok(Ok(())) => {
                info!("venue map server shut down gracefully");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "failed to save the session on shutdown");
                Err(e.into())
            }
            Err(_) => Err(ServerError::Timeout {
                timeout_seconds: force_timeout.as_secs(),
            }),
        }
    }

    /// Handle shutdown signals and trigger coordinated cancellation
    ///
    /// This function listens for SIGINT (Ctrl+C) and SIGTERM signals,
    /// and cancels the provided cancellation token when received.
    async fn shutdown_signal_handler(cancellation_token: CancellationToken) {
        let signal_received = async {
            #[cfg(unix)]
            #[allow(clippy::expect_used)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                let mut sigterm =
                    signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

                tokio::select! {
                    _ = sigterm.recv() => {
                        warn!("Received SIGTERM signal, initiating coordinated shutdown");
                        "SIGTERM"
                    },
                    _ = sigint.recv() => {
                        warn!("Received SIGINT signal, initiating coordinated shutdown");
                        "SIGINT"
                    },
                }
            }

            #[cfg(not(unix))]
            #[allow(clippy::expect_used)]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install CTRL+C signal handler");
                warn!("Received CTRL+C signal, initiating coordinated shutdown");
                "CTRL+C"
            }
        };

        // Wait for either a signal or existing cancellation
        tokio::select! {
            signal_name = signal_received => {
                warn!("Shutdown signal {} received, cancelling all operations...", signal_name);
                cancellation_token.cancel();
            },
            () = cancellation_token.cancelled() => {
                warn!("Cancellation token already cancelled, shutdown signal handler exiting");
            }
        }
    }

    /// Returns a clone of the cancellation token for coordinated shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Initiates graceful shutdown by cancelling the server's cancellation token
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Run server for testing, returns the bound address
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address.
    pub async fn run_for_testing(self) -> ServerResult<(SocketAddr, CancellationToken)> {
        let addr = self.config.socket_addr();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let token = self.cancellation_token.child_token();
        let task = token.child_token();
        tokio::spawn(async move {
            let _ = axum::serve(listener, self.router)
                .with_graceful_shutdown(async move { task.cancelled().await })
                .await;
        });

        Ok((actual_addr, token))
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state for testing
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn testing_config() -> ServerConfig {
        ServerConfig::for_testing("http://127.0.0.1:1/places", "http://127.0.0.1:1/proxy")
            .unwrap()
    }

    #[tokio::test]
    async fn server_creation() -> ServerResult<()> {
        let server = Server::new(testing_config(), ShutdownConfig::default()).await?;
        assert_eq!(server.config().environment, Environment::Testing);
        assert!(!server.cancellation_token().is_cancelled());
        assert_eq!(server.state().orchestrator().services().client_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn programmatic_shutdown() -> ServerResult<()> {
        let server = Server::new(testing_config(), ShutdownConfig::default()).await?;

        assert!(!server.cancellation_token().is_cancelled());

        server.shutdown();

        assert!(server.cancellation_token().is_cancelled());
        assert!(server.state().cancellation_token.is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_proxy_is_rejected() {
        let mut config = testing_config();
        config.proxy_url = "not a url".to_string();
        assert!(Server::new(config, ShutdownConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn saved_favorites_are_restored() -> ServerResult<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "favorites": [{
                    "provider_id": "p1",
                    "coordinates": {"lat": 40.73, "lng": -73.99},
                    "display_name": "Joe's Pizza",
                    "flags": {
                        "is_favorite": true,
                        "is_listed": true,
                        "is_in_view_on_map": false,
                        "is_selected": false
                    },
                    "services": {}
                }],
                "map_view": {"center": {"lat": 40.73, "lng": -73.99}, "zoom": 14}
            })
            .to_string(),
        )
        .unwrap();

        let mut config = testing_config();
        config.snapshot_path = Some(path);
        let orchestrator = build_orchestrator(&config).await?;

        let favorites = orchestrator.registry().favorites();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].display_name(), "Joe's Pizza");
        assert_eq!(orchestrator.map_view().map(|view| view.zoom), Some(14));
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_config_default() {
        let config = ShutdownConfig::default();
        assert_eq!(
            config.graceful_timeout,
            Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS)
        );
        assert_eq!(
            config.force_timeout,
            Duration::from_secs(DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS)
        );
    }
}

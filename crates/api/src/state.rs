// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server state management module
//!
//! Shared application state for the venue map server: configuration, the
//! discovery orchestrator and the token used for coordinated cancellation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::Service;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use venue_core::Orchestrator;

use crate::{
    config::{Environment, ServerConfig},
    error::ServerResult,
};

/// Shared application state with cancellation token support
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Server configuration
    config: ServerConfig,
    /// Coordinator of all upstream calls
    orchestrator: Orchestrator,
    /// Cancellation token for coordinated shutdown
    pub cancellation_token: CancellationToken,
}

impl ServerState {
    /// Create new server state
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `orchestrator` - Discovery orchestrator shared by every handler
    /// * `cancellation_token` - Token for coordinated cancellation
    pub fn new(
        config: ServerConfig,
        orchestrator: Orchestrator,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            orchestrator,
            cancellation_token,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Discovery orchestrator
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Perform health check operations
    pub async fn health_check(&self) -> ServerResult<HealthCheck> {
        let enabled = self.orchestrator.services().enabled();
        let services = Service::enrichment()
            .iter()
            .map(|service| (service.name().to_string(), enabled.contains(service)))
            .collect();

        let status = if self.cancellation_token.is_cancelled() {
            HealthStatus::Down {
                reason: Box::from("server is shutting down"),
            }
        } else if enabled.is_empty() {
            HealthStatus::Degraded {
                reason: Box::from("no enrichment service is enabled"),
            }
        } else {
            HealthStatus::Up
        };

        Ok(HealthCheck {
            status,
            version: Box::from(env!("CARGO_PKG_VERSION")),
            environment: self.config.environment,
            timestamp: chrono::Utc::now().to_rfc3339(),
            services,
            venues: self.orchestrator.registry().len(),
            active_calls: self.orchestrator.active_calls().len(),
        })
    }
}

/// Health status of the server
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum HealthStatus {
    /// Fully operational
    Up,

    /// Not serving requests
    Down {
        /// Human-readable explanation of why the server is down
        reason: Box<str>,
    },

    /// Serving requests with reduced functionality
    Degraded {
        /// Human-readable explanation of the degradation condition
        reason: Box<str>,
    },
}

/// Health check status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthCheck {
    /// Service status
    pub status: HealthStatus,
    /// Service version
    pub version: Box<str>,
    /// Environment
    #[schema(value_type = String)]
    pub environment: Environment,
    /// Timestamp
    pub timestamp: String,
    /// Whether each enrichment service is enabled
    #[schema(value_type = Object)]
    pub services: BTreeMap<String, bool>,
    /// Venues currently registered
    pub venues: usize,
    /// Upstream calls in flight
    pub active_calls: usize,
}

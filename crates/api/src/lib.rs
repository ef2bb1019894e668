// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Venue Map Server Implementation
//!
//! HTTP front of the venue discovery core, built with Axum. Clients start a
//! nearby search, move the viewport, select venues and poll their state
//! while the core fetches Google Places pages and enriches venues from
//! Yelp, Foursquare and Locu in the background.
//!
//! # Module Structure
//!
//! - [`config`]: Server configuration and environment management with hierarchical loading
//! - [`error`]: Error types and HTTP response handling with proper status codes
//! - [`extractors`]: JSON body extraction with descriptive rejections
//! - [`state`]: Shared application state around the [`venue_core::Orchestrator`]
//! - [`server`]: Main server implementation, lifecycle, and coordinated shutdown
//! - [`routes`]: Route configuration and HTTP request handlers
//! - [`openapi`]: `OpenAPI` specification and Swagger UI endpoints for API documentation
//!
//! # Key Features
//!
//! - **Non-blocking handlers**: Upstream calls run on the core's task tracker; handlers return immediately
//! - **Graceful Shutdown**: Coordinated termination using `CancellationToken` with timeouts
//! - **Session persistence**: Favorites and the map view survive restarts when `snapshot_path` is set
//! - **Health Monitoring**: Enabled services, venue count and calls in flight

pub mod config;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{Environment, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownConfig, build_orchestrator};
pub use state::{HealthCheck, ServerState};

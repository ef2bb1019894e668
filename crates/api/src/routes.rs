// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! This module provides route configuration and handlers for the venue map server.

pub mod handlers;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use handlers::{
    calls_handler, dismiss_notification_handler, favorite_handler, get_venue_handler,
    health_handler, list_venues_handler, notifications_handler, search_handler,
    select_venue_handler, service_request_handler, view_handler,
};

use crate::{
    openapi::{openapi_spec, swagger_ui},
    state::ServerState,
};

/// Create application routes
pub fn create_routes() -> Router<ServerState> {
    let health_routes = Router::new().route("/health", get(health_handler));

    let docs_routes = Router::new()
        .route("/api-doc/openapi.json", get(openapi_spec))
        .route("/swagger-ui", get(swagger_ui));

    let api_routes = Router::new()
        .route("/search", post(search_handler))
        .route("/view", put(view_handler))
        .route("/venues", get(list_venues_handler))
        .route("/venues/{id}", get(get_venue_handler))
        .route("/venues/{id}/select", post(select_venue_handler))
        .route("/venues/{id}/favorite", post(favorite_handler))
        .route(
            "/venues/{id}/services/{service}",
            post(service_request_handler),
        )
        .route("/calls", get(calls_handler))
        .route("/notifications", get(notifications_handler))
        .route("/notifications/{id}", delete(dismiss_notification_handler));

    let v1 = Router::new().nest("/v1", api_routes);

    Router::new()
        .merge(health_routes)
        .merge(docs_routes)
        .merge(v1)
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! `OpenAPI` documentation module
//!
//! This module provides `OpenAPI` specification and `Swagger UI` endpoints for API documentation.

use axum::{Json, http::StatusCode, response::Html};
use utoipa::OpenApi;

use crate::{
    routes::handlers::{
        self, CallView, CallsResponse, FavoriteRequest, FlagsView, NotificationsResponse,
        SearchAccepted, SearchRequest, ServiceRequestResponse, ServiceView, VenueView,
        ViewRequest, ViewResponse,
    },
    state::{HealthCheck, HealthStatus},
};

/// `OpenAPI` document of every route
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Venue Map API",
        description = "Restaurant discovery around a point, enriched with Yelp, Foursquare and Locu."
    ),
    paths(
        handlers::health_handler,
        handlers::search_handler,
        handlers::view_handler,
        handlers::list_venues_handler,
        handlers::get_venue_handler,
        handlers::select_venue_handler,
        handlers::favorite_handler,
        handlers::service_request_handler,
        handlers::calls_handler,
        handlers::notifications_handler,
        handlers::dismiss_notification_handler,
    ),
    components(schemas(
        HealthCheck,
        HealthStatus,
        SearchRequest,
        SearchAccepted,
        ViewRequest,
        ViewResponse,
        FlagsView,
        ServiceView,
        VenueView,
        FavoriteRequest,
        ServiceRequestResponse,
        CallView,
        CallsResponse,
        NotificationsResponse,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "venues", description = "Search, viewport and venue enrichment"),
        (name = "calls", description = "Upstream calls in flight"),
        (name = "notifications", description = "User-facing failure notices")
    )
)]
pub struct ApiDoc;

/// `OpenAPI` specification endpoint
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Swagger UI endpoint
pub async fn swagger_ui() -> Result<Html<&'static str>, StatusCode> {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Venue Map API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css" />
    <style>
        html { box-sizing: border-box; overflow: -moz-scrollbars-vertical; overflow-y: scroll; }
        *, *:before, *:after { box-sizing: inherit; }
        body { margin:0; background: #fafafa; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: '/api-doc/openapi.json',
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                plugins: [
                    SwaggerUIBundle.plugins.DownloadUrl
                ],
                layout: "StandaloneLayout"
            });
        }
    </script>
</body>
</html>
"#;
    Ok(Html(html))
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP request handlers module
//!
//! Thin adapters between HTTP and the [`Orchestrator`](venue_core::Orchestrator).
//! Handlers never wait for upstream calls: they start them and return the
//! current state of the venue, which clients poll.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Bounds, CallType, Coordinates, SearchType, Service};
use utoipa::{IntoParams, ToSchema};
use venue_core::{
    CallSummary, CoreError, Entity, EntityFlags, MapView, Notification, ProviderId,
    RequestOutcome, SkipReason,
};

use crate::{
    error::ServerError,
    extractors::JsonExtractor,
    state::{HealthCheck, ServerState},
};

/// Largest radius accepted for a nearby search, in meters
pub const MAX_SEARCH_RADIUS_METERS: f64 = 50_000.0;

/// Health check endpoint handler
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check endpoint",
    description = "Returns the current health status of the server including version, environment, which enrichment services are enabled and how many calls are in flight.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthCheck),
        (status = 503, description = "Service unavailable", body = String)
    )
)]
pub async fn health_handler(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, ServerError> {
    let health = state.health_check().await?;
    Ok(Json(health))
}

fn validate_coordinates(point: &Coordinates) -> Result<(), ServerError> {
    if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
        return Err(ServerError::ValidationError(format!(
            "coordinates out of range: {},{}",
            point.lat, point.lng
        )));
    }
    Ok(())
}

/// Nearby search request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Search centre
    pub center: Coordinates,
    /// Search radius in meters; defaults to the core configuration
    #[schema(example = 1500.0)]
    pub radius_meters: Option<f64>,
}

impl SearchRequest {
    /// Checks coordinate ranges and the radius limit
    pub fn validate(&self) -> Result<(), ServerError> {
        validate_coordinates(&self.center)?;
        if let Some(radius) = self.radius_meters
            && (!radius.is_finite() || radius <= 0.0 || radius > MAX_SEARCH_RADIUS_METERS)
        {
            return Err(ServerError::ValidationError(format!(
                "radius_meters must be in (0, {MAX_SEARCH_RADIUS_METERS}], got {radius}"
            )));
        }
        Ok(())
    }
}

/// Accepted search
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchAccepted {
    /// Generation of the search; a newer search supersedes it
    pub generation: usize,
}

/// Start a nearby search
///
/// Result pages keep arriving after the response; poll `/v1/venues`.
#[utoipa::path(
    post,
    path = "/v1/search",
    tag = "venues",
    summary = "Search restaurants around a point",
    request_body = SearchRequest,
    responses(
        (status = 202, description = "Search started", body = SearchAccepted),
        (status = 400, description = "Invalid coordinates or radius", body = String)
    )
)]
pub async fn search_handler(
    State(state): State<ServerState>,
    JsonExtractor(request): JsonExtractor<SearchRequest>,
) -> Result<impl IntoResponse, ServerError> {
    request.validate()?;
    let generation = state
        .orchestrator()
        .search_nearby(request.center, request.radius_meters);
    Ok((
        StatusCode::ACCEPTED,
        Json(SearchAccepted {
            generation: generation.index(),
        }),
    ))
}

/// Map viewport update
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ViewRequest {
    /// Visible area
    pub bounds: Bounds,
    /// Zoom level; the previous one is kept when absent
    pub zoom: Option<u8>,
}

/// Result of a viewport update
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ViewResponse {
    /// Venues inside the viewport
    pub in_view: usize,
    /// Persisted map view
    #[schema(value_type = Option<Object>)]
    pub map_view: Option<MapView>,
}

/// Update the map viewport
#[utoipa::path(
    put,
    path = "/v1/view",
    tag = "venues",
    summary = "Update the map viewport",
    request_body = ViewRequest,
    responses(
        (status = 200, description = "Viewport recorded", body = ViewResponse),
        (status = 400, description = "Invalid bounds", body = String)
    )
)]
pub async fn view_handler(
    State(state): State<ServerState>,
    JsonExtractor(request): JsonExtractor<ViewRequest>,
) -> Result<Json<ViewResponse>, ServerError> {
    validate_coordinates(&request.bounds.south_west)?;
    validate_coordinates(&request.bounds.north_east)?;
    if request.bounds.south_west.lat > request.bounds.north_east.lat {
        return Err(ServerError::ValidationError(
            "south_west must not be north of north_east".to_string(),
        ));
    }

    let orchestrator = state.orchestrator();
    let in_view = orchestrator.update_view(request.bounds, request.zoom).await;
    Ok(Json(ViewResponse {
        in_view,
        map_view: orchestrator.map_view(),
    }))
}

/// Venue flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct FlagsView {
    /// Pinned by the user
    pub is_favorite: bool,
    /// Shown in the result list
    pub is_listed: bool,
    /// Inside the current viewport
    pub is_in_view_on_map: bool,
    /// Details open
    pub is_selected: bool,
}

impl From<EntityFlags> for FlagsView {
    fn from(flags: EntityFlags) -> Self {
        Self {
            is_favorite: flags.is_favorite,
            is_listed: flags.is_listed,
            is_in_view_on_map: flags.is_in_view_on_map,
            is_selected: flags.is_selected,
        }
    }
}

/// State of one service for a venue
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceView {
    /// How far enrichment got
    pub search_type: SearchType,
    /// A call is in flight
    pub loading: bool,
    /// Mapped attributes
    #[schema(value_type = Object)]
    pub attributes: BTreeMap<String, Value>,
}

/// A venue as seen by clients
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VenueView {
    /// Google place id
    pub provider_id: String,
    /// Name shown on the map
    pub display_name: String,
    /// Position
    pub coordinates: Coordinates,
    /// Flags
    pub flags: FlagsView,
    /// Per-service state keyed by service name
    pub services: BTreeMap<String, ServiceView>,
}

impl From<&Arc<Entity>> for VenueView {
    fn from(entity: &Arc<Entity>) -> Self {
        let services = Service::all()
            .iter()
            .map(|&service| {
                (
                    service.name().to_string(),
                    ServiceView {
                        search_type: entity.search_type(service),
                        loading: entity.is_loading(service),
                        attributes: entity.attributes(service),
                    },
                )
            })
            .collect();

        Self {
            provider_id: entity.provider_id().to_string(),
            display_name: entity.display_name(),
            coordinates: entity.coordinates(),
            flags: entity.flags().into(),
            services,
        }
    }
}

/// Venue list filters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VenueFilter {
    /// Only venues in the result list
    #[serde(default)]
    pub listed: bool,
    /// Only favorites
    #[serde(default)]
    pub favorites: bool,
}

/// List venues
#[utoipa::path(
    get,
    path = "/v1/venues",
    tag = "venues",
    summary = "List registered venues",
    params(VenueFilter),
    responses(
        (status = 200, description = "Venues in registration order", body = Vec<VenueView>)
    )
)]
pub async fn list_venues_handler(
    State(state): State<ServerState>,
    Query(filter): Query<VenueFilter>,
) -> Json<Vec<VenueView>> {
    let registry = state.orchestrator().registry();
    let venues = if filter.favorites {
        registry.favorites()
    } else if filter.listed {
        registry.listed()
    } else {
        registry.all()
    };
    Json(venues.iter().map(VenueView::from).collect())
}

/// Get one venue
#[utoipa::path(
    get,
    path = "/v1/venues/{id}",
    tag = "venues",
    summary = "Get a venue",
    params(("id" = String, Path, description = "Google place id")),
    responses(
        (status = 200, description = "Venue found", body = VenueView),
        (status = 404, description = "Unknown venue", body = String)
    )
)]
pub async fn get_venue_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<VenueView>, ServerError> {
    let entity = state.orchestrator().entity(&ProviderId::new(id))?;
    Ok(Json(VenueView::from(&entity)))
}

/// Select a venue
///
/// Deselects any other venue and starts detail calls on every enabled service.
#[utoipa::path(
    post,
    path = "/v1/venues/{id}/select",
    tag = "venues",
    summary = "Select a venue and load its details",
    params(("id" = String, Path, description = "Google place id")),
    responses(
        (status = 200, description = "Venue selected", body = VenueView),
        (status = 404, description = "Unknown venue", body = String)
    )
)]
pub async fn select_venue_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<VenueView>, ServerError> {
    let entity = state.orchestrator().select(&ProviderId::new(id))?;
    Ok(Json(VenueView::from(&entity)))
}

/// Favorite toggle
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FavoriteRequest {
    /// New favorite state
    pub favorite: bool,
}

/// Pin or unpin a venue
#[utoipa::path(
    post,
    path = "/v1/venues/{id}/favorite",
    tag = "venues",
    summary = "Pin or unpin a venue",
    params(("id" = String, Path, description = "Google place id")),
    request_body = FavoriteRequest,
    responses(
        (status = 200, description = "Favorite state updated", body = VenueView),
        (status = 404, description = "Unknown venue", body = String)
    )
)]
pub async fn favorite_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    JsonExtractor(request): JsonExtractor<FavoriteRequest>,
) -> Result<Json<VenueView>, ServerError> {
    let entity = state
        .orchestrator()
        .set_favorite(&ProviderId::new(id), request.favorite)
        .await?;
    Ok(Json(VenueView::from(&entity)))
}

/// What a detail request did
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceRequestResponse {
    /// `issued`, `deferred`, `already_active` or `skipped`
    pub outcome: String,
    /// Why the request was skipped
    pub reason: Option<String>,
    /// Venue state after the request
    pub venue: VenueView,
}

fn describe_outcome(outcome: RequestOutcome) -> (&'static str, Option<&'static str>) {
    match outcome {
        RequestOutcome::Issued => ("issued", None),
        RequestOutcome::Deferred => ("deferred", None),
        RequestOutcome::AlreadyActive => ("already_active", None),
        RequestOutcome::Skipped(reason) => (
            "skipped",
            Some(match reason {
                SkipReason::Disposed => "disposed",
                SkipReason::ServiceDisabled => "service_disabled",
                SkipReason::AlreadyResolved => "already_resolved",
            }),
        ),
    }
}

/// Request details of a venue from one service
#[utoipa::path(
    post,
    path = "/v1/venues/{id}/services/{service}",
    tag = "venues",
    summary = "Request details from one service",
    params(
        ("id" = String, Path, description = "Google place id"),
        ("service" = Service, Path, description = "Service name")
    ),
    responses(
        (status = 200, description = "Request handled", body = ServiceRequestResponse),
        (status = 400, description = "Service not enabled", body = String),
        (status = 404, description = "Unknown venue", body = String)
    )
)]
pub async fn service_request_handler(
    State(state): State<ServerState>,
    Path((id, service)): Path<(String, Service)>,
) -> Result<Json<ServiceRequestResponse>, ServerError> {
    let orchestrator = state.orchestrator();
    let entity = orchestrator.entity(&ProviderId::new(id))?;

    let outcome = if service.is_map_provider() {
        orchestrator.request_place_details(&entity)
    } else if orchestrator.services().get(service).is_none() {
        return Err(CoreError::ServiceDisabled { service }.into());
    } else {
        orchestrator.request_detailed(service, &entity)
    };

    let (outcome, reason) = describe_outcome(outcome);
    Ok(Json(ServiceRequestResponse {
        outcome: outcome.to_string(),
        reason: reason.map(str::to_string),
        venue: VenueView::from(&entity),
    }))
}

/// A tracked call
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallView {
    /// Target service
    pub service: Service,
    /// Basic or detailed
    pub call_type: CallType,
    /// Target venue
    pub provider_id: String,
}

impl From<CallSummary> for CallView {
    fn from(summary: CallSummary) -> Self {
        Self {
            service: summary.service,
            call_type: summary.call_type,
            provider_id: summary.provider_id.to_string(),
        }
    }
}

/// Calls in flight and requests waiting for them
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallsResponse {
    /// Running calls
    pub active: Vec<CallView>,
    /// Detail requests parked behind a basic call
    pub queued: Vec<CallView>,
}

/// List tracked calls
#[utoipa::path(
    get,
    path = "/v1/calls",
    tag = "calls",
    summary = "List calls in flight",
    responses(
        (status = 200, description = "Tracked calls", body = CallsResponse)
    )
)]
pub async fn calls_handler(State(state): State<ServerState>) -> Json<CallsResponse> {
    let orchestrator = state.orchestrator();
    Json(CallsResponse {
        active: orchestrator
            .active_calls()
            .into_iter()
            .map(CallView::from)
            .collect(),
        queued: orchestrator
            .queued_intercepts()
            .into_iter()
            .map(CallView::from)
            .collect(),
    })
}

/// Active notifications
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationsResponse {
    /// Oldest first
    #[schema(value_type = Vec<Object>)]
    pub notifications: Vec<Notification>,
}

/// List active notifications
#[utoipa::path(
    get,
    path = "/v1/notifications",
    tag = "notifications",
    summary = "List active notifications",
    responses(
        (status = 200, description = "Active notifications", body = NotificationsResponse)
    )
)]
pub async fn notifications_handler(State(state): State<ServerState>) -> Json<NotificationsResponse> {
    Json(NotificationsResponse {
        notifications: state.orchestrator().notifications().active(),
    })
}

/// Dismiss a notification
#[utoipa::path(
    delete,
    path = "/v1/notifications/{id}",
    tag = "notifications",
    summary = "Dismiss a notification",
    params(("id" = u64, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Dismissed"),
        (status = 404, description = "No such notification", body = String)
    )
)]
pub async fn dismiss_notification_handler(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ServerError> {
    if state.orchestrator().notifications().dismiss(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound {
            resource: format!("notification {id}"),
        })
    }
}

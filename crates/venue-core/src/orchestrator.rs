// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Coordination of map provider and enrichment calls
//!
//! Per venue and service, enrichment moves `None -> Basic -> detail state`,
//! or `None -> NotFound` when no record matches. A detailed request made
//! before the basic call resolved is parked in the [`ApiLock`] and replayed
//! when that call completes. Every call runs as a task on a shared
//! [`TaskTracker`] so callers can wait for the whole session to settle.

use std::{fmt, sync::Arc};

use api_client::{ApiError, FailureKind};
use external_apis::{
    DEFAULT_ACCURACY_RADIUS_METERS, DEFAULT_CALL_TIMEOUT, EnrichmentClient, ParamContext,
    PlaceSummary, PlacesClient, PlacesError, ServiceRegistry, ServiceSettings,
};
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{Bounds, CallType, Coordinates, SearchType, Service};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::{
    api_lock::{ApiLock, CallSummary, InterceptedCall},
    config::CoreConfig,
    entity::{Entity, EntityCallbacks, ProviderId, TracingCallbacks},
    error::{CoreError, CoreResult},
    generation::{CallGenerations, Generation},
    mapping::FieldSchema,
    matching::{MatchCandidate, MatchRequest, MatchWorker, MatchedRecord, match_candidate},
    notify::NotificationCenter,
    persist::{MapView, SessionSnapshot, SnapshotWriter},
    registry::EntityRegistry,
};

/// Zoom assumed when a viewport update does not carry one
pub const DEFAULT_ZOOM: u8 = 15;

/// Why a request did not issue a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The venue was disposed
    Disposed,
    /// The service is not enabled, or has no such call
    ServiceDisabled,
    /// The venue already reached or passed the requested state
    AlreadyResolved,
}

/// What a request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A call was started
    Issued,
    /// Parked until the basic call on the same service completes
    Deferred,
    /// The same call is already running
    AlreadyActive,
    /// Nothing to do
    Skipped(SkipReason),
}

/// Result of feeding one page of search results into the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Venues created
    pub created: usize,
    /// Known venues refreshed
    pub refreshed: usize,
    /// Venues evicted to make room
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct ViewState {
    bounds: Option<Bounds>,
    map_view: Option<MapView>,
}

struct Inner {
    config: CoreConfig,
    registry: EntityRegistry,
    schema: FieldSchema,
    lock: ApiLock,
    services: ServiceRegistry,
    enrichment: EnrichmentClient,
    places: PlacesClient,
    matcher: MatchWorker,
    notifications: NotificationCenter,
    generations: CallGenerations,
    tasks: TaskTracker,
    callbacks: Arc<dyn EntityCallbacks>,
    snapshots: Option<SnapshotWriter>,
    view: Mutex<ViewState>,
}

/// Entry point of the coordination core; cheap to clone
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("venues", &self.inner.registry.len())
            .field("services", &self.inner.services.client_names())
            .field("pending_tasks", &self.inner.tasks.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: CoreConfig,
    places: PlacesClient,
    enrichment: EnrichmentClient,
    services: ServiceRegistry,
    schema: FieldSchema,
    callbacks: Arc<dyn EntityCallbacks>,
    snapshots: Option<SnapshotWriter>,
}

impl fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    /// Enabled enrichment services; defaults to the standard registry
    #[must_use]
    pub fn services(mut self, services: ServiceRegistry) -> Self {
        self.services = services;
        self
    }

    /// Field mapping tables; defaults to [`FieldSchema::standard`]
    #[must_use]
    pub fn schema(mut self, schema: FieldSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Presentation hooks given to every venue
    #[must_use]
    pub fn callbacks(mut self, callbacks: Arc<dyn EntityCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Persist favorites and the map view through `writer`
    #[must_use]
    pub fn snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    /// Validate the configuration and build
    ///
    /// Services still on the library default timeout or accuracy radius take
    /// the values of the core configuration.
    pub fn build(self) -> CoreResult<Orchestrator> {
        self.config.validate()?;

        let mut services = ServiceRegistry::new();
        for service in self.services.enabled() {
            let Some(mut settings) = self.services.get(service).cloned() else {
                continue;
            };
            if settings.timeout == DEFAULT_CALL_TIMEOUT {
                settings = settings.with_timeout(self.config.call_timeout());
            }
            if (settings.accuracy_radius_meters - DEFAULT_ACCURACY_RADIUS_METERS).abs() < f64::EPSILON {
                settings = settings.with_accuracy_radius(self.config.accuracy_radius_meters);
            }
            services.register(settings).map_err(CoreError::config)?;
        }

        info!(
            services = ?services.client_names(),
            eviction_cap = self.config.eviction_cap,
            persistence = self.snapshots.is_some(),
            "venue orchestrator ready"
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                registry: EntityRegistry::new(self.config.eviction_cap, self.config.eviction_bulk),
                notifications: NotificationCenter::new(self.config.verbose_ttl()),
                schema: self.schema,
                lock: ApiLock::new(),
                services,
                enrichment: self.enrichment,
                places: self.places,
                matcher: MatchWorker,
                generations: CallGenerations::new(),
                tasks: TaskTracker::new(),
                callbacks: self.callbacks,
                snapshots: self.snapshots,
                view: Mutex::new(ViewState::default()),
                config: self.config,
            }),
        })
    }
}

impl Orchestrator {
    /// Start building an orchestrator
    pub fn builder(
        config: CoreConfig,
        places: PlacesClient,
        enrichment: EnrichmentClient,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            places,
            enrichment,
            services: ServiceRegistry::standard(),
            schema: FieldSchema::standard(),
            callbacks: Arc::new(TracingCallbacks),
            snapshots: None,
        }
    }

    /// Core configuration
    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Known venues
    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    /// Field mapping tables
    pub fn schema(&self) -> &FieldSchema {
        &self.inner.schema
    }

    /// In-flight call tracker
    pub fn api_lock(&self) -> &ApiLock {
        &self.inner.lock
    }

    /// Enabled enrichment services
    pub fn services(&self) -> &ServiceRegistry {
        &self.inner.services
    }

    /// User-facing notifications
    pub fn notifications(&self) -> &NotificationCenter {
        &self.inner.notifications
    }

    /// Running calls
    pub fn active_calls(&self) -> Vec<CallSummary> {
        self.inner.lock.active_calls()
    }

    /// Detailed requests waiting for a basic call
    pub fn queued_intercepts(&self) -> Vec<CallSummary> {
        self.inner.lock.queued_intercepts()
    }

    /// Last known map view
    pub fn map_view(&self) -> Option<MapView> {
        self.inner.view.lock().map_view
    }

    /// Venue by provider id
    pub fn entity(&self, id: &ProviderId) -> CoreResult<Arc<Entity>> {
        self.inner
            .registry
            .find_by_provider_id(id)
            .ok_or_else(|| CoreError::unknown_entity(id))
    }

    /// Search the map provider around `center`, paging in the background
    ///
    /// Starting a search supersedes any earlier one; its remaining pages are
    /// not fetched.
    #[instrument(skip(self))]
    pub fn search_nearby(&self, center: Coordinates, radius_meters: Option<f64>) -> Generation {
        let radius = radius_meters.unwrap_or(self.inner.config.default_search_radius_meters);
        let generation = self.inner.generations.begin();
        info!(generation = generation.index(), radius, "nearby search started");

        let this = self.clone();
        self.inner.tasks.spawn(async move {
            this.paginate(generation, center, radius).await;
        });
        generation
    }

    async fn paginate(&self, generation: Generation, center: Coordinates, radius: f64) {
        let mut page_token: Option<String> = None;
        let mut pages = 0_usize;

        loop {
            if !self.inner.generations.is_current(generation) {
                debug!(generation = generation.index(), pages, "search superseded");
                return;
            }

            let result = self
                .inner
                .places
                .nearby_search(center, radius, page_token.as_deref())
                .await;

            if !self.inner.generations.is_current(generation) {
                debug!(generation = generation.index(), pages, "search superseded");
                return;
            }

            match result {
                Ok(page) => {
                    pages += 1;
                    let summary = self.ingest(page.results);
                    debug!(
                        generation = generation.index(),
                        page = pages,
                        created = summary.created,
                        refreshed = summary.refreshed,
                        evicted = summary.evicted,
                        "search page ingested"
                    );
                    match page.next_page_token {
                        Some(token) => {
                            page_token = Some(token);
                            tokio::time::sleep(self.inner.config.page_delay()).await;
                        }
                        None => {
                            info!(generation = generation.index(), pages, "nearby search complete");
                            return;
                        }
                    }
                }
                Err(PlacesError::ZeroResults) => {
                    if pages == 0 {
                        self.inner.notifications.zero_results();
                    }
                    return;
                }
                Err(PlacesError::OverQueryLimit) => {
                    warn!(generation = generation.index(), "map provider query limit reached");
                    self.inner.notifications.rate_limited(Service::Google);
                    return;
                }
                Err(e) => {
                    warn!(generation = generation.index(), error = %e, "nearby search failed");
                    let error = ApiError::from(e);
                    match error.failure_kind() {
                        FailureKind::Semantic => {
                            self.inner
                                .notifications
                                .unreadable_response(Service::Google, "this area");
                        }
                        FailureKind::Transport | FailureKind::Soft => {
                            self.inner
                                .notifications
                                .transport_failure(Service::Google, "this area");
                        }
                    }
                    return;
                }
            }
        }
    }

    /// Create or refresh venues from one page of search results
    pub fn ingest(&self, results: Vec<PlaceSummary>) -> IngestSummary {
        let inner = &self.inner;
        let bounds = inner.view.lock().bounds;
        let mut created = Vec::new();
        let mut refreshed = 0;

        for place in results {
            let in_view = bounds.is_none_or(|b| b.contains(&place.location));
            let id = ProviderId::new(place.place_id.as_str());

            let entity = match inner.registry.find_by_provider_id(&id) {
                Some(existing) => {
                    existing.set_coordinates(place.location);
                    existing.set_display_name(place.name.as_str());
                    refreshed += 1;
                    existing
                }
                None => {
                    let entity = Arc::new(Entity::new(
                        id,
                        inner.registry.allocate_sequence(),
                        place.location,
                        place.name.as_str(),
                        &inner.schema,
                        Arc::clone(&inner.callbacks),
                    ));
                    created.push(Arc::clone(&entity));
                    entity
                }
            };

            inner.schema.update(&entity, Service::Google, &place.raw);
            entity.update_flags(|flags| {
                flags.is_listed = true;
                flags.is_in_view_on_map = in_view;
            });
        }

        let summary = IngestSummary {
            created: created.len(),
            refreshed,
            evicted: 0,
        };
        let evicted = inner.registry.insert_many(created);
        if summary.created > 0 {
            inner.notifications.entities_populated();
        }

        IngestSummary {
            evicted: evicted.len(),
            ..summary
        }
    }

    /// Ask for detailed data of `entity` on `service`
    ///
    /// Without a basic match yet, the request is parked and a basic call is
    /// started; it is replayed once that call completes.
    #[instrument(skip(self, entity), fields(provider_id = %entity.provider_id()))]
    pub fn request_detailed(&self, service: Service, entity: &Arc<Entity>) -> RequestOutcome {
        if service.is_map_provider() {
            return self.request_place_details(entity);
        }
        if entity.is_disposed() {
            return RequestOutcome::Skipped(SkipReason::Disposed);
        }
        let Some(settings) = self.inner.services.get(service).cloned() else {
            return RequestOutcome::Skipped(SkipReason::ServiceDisabled);
        };

        match entity.search_type(service) {
            SearchType::None => {
                let queued = self
                    .inner
                    .lock
                    .enqueue_intercept(service, CallType::Detailed, entity);
                debug!(%service, queued, "detailed request parked behind basic call");
                self.request_basic(service, entity);
                RequestOutcome::Deferred
            }
            SearchType::Basic => {
                if !self
                    .inner
                    .lock
                    .try_mark_active(service, CallType::Detailed, entity)
                {
                    return RequestOutcome::AlreadyActive;
                }
                let this = self.clone();
                let entity = Arc::clone(entity);
                self.inner.tasks.spawn(async move {
                    this.run_detailed(service, settings, entity).await;
                });
                RequestOutcome::Issued
            }
            SearchType::NotFound
            | SearchType::Places
            | SearchType::Business
            | SearchType::Venue
            | SearchType::Search => RequestOutcome::Skipped(SkipReason::AlreadyResolved),
        }
    }

    /// Start a basic call using the listed venues as the batch context
    pub fn request_basic(&self, service: Service, entity: &Arc<Entity>) -> RequestOutcome {
        let batch = self.inner.registry.listed();
        self.request_basic_with_context(service, entity, batch)
    }

    /// Start a basic call; records not claimed by `entity` are matched against `batch`
    #[instrument(skip(self, entity, batch), fields(provider_id = %entity.provider_id(), batch = batch.len()))]
    pub fn request_basic_with_context(
        &self,
        service: Service,
        entity: &Arc<Entity>,
        batch: Vec<Arc<Entity>>,
    ) -> RequestOutcome {
        if service.is_map_provider() {
            return RequestOutcome::Skipped(SkipReason::ServiceDisabled);
        }
        if entity.is_disposed() {
            return RequestOutcome::Skipped(SkipReason::Disposed);
        }
        let Some(settings) = self.inner.services.get(service).cloned() else {
            return RequestOutcome::Skipped(SkipReason::ServiceDisabled);
        };

        if !entity.search_type(service).is_none() {
            let parked = self.inner.lock.take_intercepts(service, entity);
            self.replay(parked);
            return RequestOutcome::Skipped(SkipReason::AlreadyResolved);
        }

        if !self
            .inner
            .lock
            .try_mark_active(service, CallType::Basic, entity)
        {
            return RequestOutcome::AlreadyActive;
        }

        let this = self.clone();
        let entity = Arc::clone(entity);
        self.inner.tasks.spawn(async move {
            this.run_basic(service, settings, entity, batch).await;
        });
        RequestOutcome::Issued
    }

    /// Fetch Google place details for `entity`
    #[instrument(skip(self, entity), fields(provider_id = %entity.provider_id()))]
    pub fn request_place_details(&self, entity: &Arc<Entity>) -> RequestOutcome {
        if entity.is_disposed() {
            return RequestOutcome::Skipped(SkipReason::Disposed);
        }
        if entity.search_type(Service::Google).is_detailed() {
            return RequestOutcome::Skipped(SkipReason::AlreadyResolved);
        }
        if !self
            .inner
            .lock
            .try_mark_active(Service::Google, CallType::Detailed, entity)
        {
            return RequestOutcome::AlreadyActive;
        }

        let this = self.clone();
        let entity = Arc::clone(entity);
        self.inner.tasks.spawn(async move {
            this.run_place_details(entity).await;
        });
        RequestOutcome::Issued
    }

    /// Make `id` the selected venue and request its details everywhere
    #[instrument(skip(self), fields(provider_id = %id))]
    pub fn select(&self, id: &ProviderId) -> CoreResult<Arc<Entity>> {
        let entity = self.entity(id)?;

        for other in self.inner.registry.all() {
            if other.flags().is_selected && !Arc::ptr_eq(&other, &entity) {
                other.update_flags(|flags| flags.is_selected = false);
                other.callbacks().on_deselected(other.provider_id());
            }
        }

        if !entity.flags().is_selected {
            entity.update_flags(|flags| flags.is_selected = true);
            entity.callbacks().on_selected(entity.provider_id());
        }

        self.request_place_details(&entity);
        for service in self.inner.services.enabled() {
            self.request_detailed(service, &entity);
        }
        Ok(entity)
    }

    /// Pin or unpin a venue and persist the change
    #[instrument(skip(self), fields(provider_id = %id))]
    pub async fn set_favorite(&self, id: &ProviderId, favorite: bool) -> CoreResult<Arc<Entity>> {
        let entity = self.entity(id)?;
        entity.update_flags(|flags| flags.is_favorite = favorite);
        self.persist().await;
        Ok(entity)
    }

    /// Record the viewport, refresh in-view flags and persist the map view
    ///
    /// Returns how many venues are in view.
    pub async fn update_view(&self, bounds: Bounds, zoom: Option<u8>) -> usize {
        let in_view = self.inner.registry.update_view(&bounds);
        {
            let mut view = self.inner.view.lock();
            let zoom = zoom
                .or(view.map_view.map(|v| v.zoom))
                .unwrap_or(DEFAULT_ZOOM);
            view.bounds = Some(bounds);
            view.map_view = Some(MapView {
                center: bounds.center(),
                zoom,
            });
        }
        self.persist().await;
        in_view
    }

    /// Favorites and map view in their persisted form
    ///
    /// Selection and viewport flags are session-only and cleared.
    pub fn snapshot(&self) -> SessionSnapshot {
        let favorites = self
            .inner
            .registry
            .favorites()
            .iter()
            .map(|entity| {
                let mut blueprint = self.inner.schema.deconstruct(entity);
                blueprint.flags.is_selected = false;
                blueprint.flags.is_in_view_on_map = false;
                blueprint
            })
            .collect();

        SessionSnapshot {
            favorites,
            map_view: self.map_view(),
        }
    }

    /// Recreate favorites and the map view from a snapshot
    ///
    /// Venues already registered are left alone. Returns how many were restored.
    pub fn restore(&self, snapshot: &SessionSnapshot) -> usize {
        let inner = &self.inner;
        let mut restored = Vec::new();

        for blueprint in &snapshot.favorites {
            if inner
                .registry
                .find_by_provider_id(&blueprint.provider_id)
                .is_some()
            {
                continue;
            }
            let entity = Arc::new(Entity::new(
                blueprint.provider_id.clone(),
                inner.registry.allocate_sequence(),
                blueprint.coordinates,
                blueprint.display_name.as_str(),
                &inner.schema,
                Arc::clone(&inner.callbacks),
            ));
            inner.schema.rebuild(&entity, blueprint, blueprint.coordinates);
            entity.update_flags(|flags| flags.is_favorite = true);
            restored.push(entity);
        }

        let count = restored.len();
        inner.registry.insert_many(restored);
        if let Some(map_view) = snapshot.map_view {
            inner.view.lock().map_view = Some(map_view);
        }
        info!(restored = count, "session restored");
        count
    }

    /// Wait until every spawned call, replay and match has finished
    pub async fn settle(&self) {
        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    /// Stop paginating, let running calls finish and write the last snapshot
    pub async fn shutdown(&self) -> CoreResult<()> {
        self.inner.generations.cancel_all();
        self.settle().await;
        if let Some(writer) = &self.inner.snapshots {
            writer.save(self.snapshot()).await?;
            writer.flush().await?;
        }
        info!("venue orchestrator stopped");
        Ok(())
    }

    async fn persist(&self) {
        let Some(writer) = &self.inner.snapshots else {
            return;
        };
        if let Err(e) = writer.save(self.snapshot()).await {
            warn!(error = %e, "failed to persist session snapshot");
        }
    }

    async fn run_basic(
        &self,
        service: Service,
        settings: ServiceSettings,
        entity: Arc<Entity>,
        batch: Vec<Arc<Entity>>,
    ) {
        let name = entity.display_name();
        let ctx = ParamContext::around(
            entity.coordinates(),
            settings.accuracy_radius_meters,
            &name,
        );
        let lifetime = entity.lifetime();

        let result = tokio::select! {
            () = lifetime.cancelled() => None,
            result = self.inner.enrichment.basic(&settings, &ctx) => Some(result),
        };

        match result {
            None => {
                debug!(%service, provider_id = %entity.provider_id(), "venue disposed during basic call");
                self.inner.lock.dequeue_intercept(service, &entity);
            }
            Some(Ok(items)) => self.apply_basic(service, &settings, &entity, items, &batch),
            Some(Err(e)) => self.fail(service, CallType::Basic, &entity, e.into()),
        }

        let parked = self
            .inner
            .lock
            .mark_complete(service, CallType::Basic, &entity);
        self.replay(parked);
    }

    async fn run_detailed(&self, service: Service, settings: ServiceSettings, entity: Arc<Entity>) {
        let name = entity.display_name();
        let lifetime = entity.lifetime();

        let result = match entity.attribute_string(service, &settings.id_field) {
            None => Some(Err(ApiError::InvalidResponse {
                message: format!("{} has no {}", entity.provider_id(), settings.id_field),
            })),
            Some(service_id) => {
                let ctx = ParamContext::around(
                    entity.coordinates(),
                    settings.accuracy_radius_meters,
                    &name,
                )
                .with_service_id(&service_id);

                tokio::select! {
                    () = lifetime.cancelled() => None,
                    result = self.inner.enrichment.detailed(&settings, &ctx) => {
                        Some(result.map_err(ApiError::from))
                    }
                }
            }
        };

        match result {
            None => {
                debug!(%service, provider_id = %entity.provider_id(), "venue disposed during detailed call");
                self.inner.lock.dequeue_intercept(service, &entity);
            }
            Some(Ok(record)) => {
                self.inner.schema.update(&entity, service, &record);
                entity.advance_search(service, service.detail_state());
            }
            Some(Err(e)) => self.fail(service, CallType::Detailed, &entity, e),
        }

        let parked = self
            .inner
            .lock
            .mark_complete(service, CallType::Detailed, &entity);
        self.replay(parked);
    }

    async fn run_place_details(&self, entity: Arc<Entity>) {
        let lifetime = entity.lifetime();
        let result = tokio::select! {
            () = lifetime.cancelled() => None,
            result = self.inner.places.place_details(entity.provider_id().as_str()) => Some(result),
        };

        match result {
            None => {
                debug!(provider_id = %entity.provider_id(), "venue disposed during place details");
            }
            Some(Ok(details)) => {
                self.inner.schema.update(&entity, Service::Google, &details);
                if let Some(name) = details.get("name").and_then(Value::as_str) {
                    entity.set_display_name(name);
                }
                entity.advance_search(Service::Google, SearchType::Places);
            }
            Some(Err(e)) => self.fail(Service::Google, CallType::Detailed, &entity, e.into()),
        }

        let parked = self
            .inner
            .lock
            .mark_complete(Service::Google, CallType::Detailed, &entity);
        self.replay(parked);
    }

    /// Claim the target's record, then hand the rest to the match worker
    fn apply_basic(
        &self,
        service: Service,
        settings: &ServiceSettings,
        entity: &Arc<Entity>,
        mut items: Vec<Value>,
        batch: &[Arc<Entity>],
    ) {
        let config = &self.inner.config;
        let target = candidate_of(entity);
        let claimed = vec![false; items.len()];

        match match_candidate(
            &target,
            &items,
            &claimed,
            &settings.match_aliases,
            target.coordinates,
            config.match_max_distance_meters,
            config.match_min_confidence,
        ) {
            Some(index) => {
                let record = items.remove(index);
                self.apply_record(service, settings, entity, &record);
                entity.advance_search(service, SearchType::Basic);
            }
            None => {
                if entity.advance_search(service, SearchType::NotFound) {
                    self.inner.notifications.no_match(service, &target.name);
                }
            }
        }

        self.delegate_matches(service, settings, entity, items, batch);
    }

    fn apply_record(
        &self,
        service: Service,
        settings: &ServiceSettings,
        entity: &Entity,
        record: &Value,
    ) {
        self.inner.schema.update(entity, service, record);
        if let (Some(id), Some(slot)) = (
            settings.match_aliases.id.resolve(record),
            entity.service(service).slot(&settings.id_field),
        ) {
            slot.set(id.clone());
        }
    }

    fn delegate_matches(
        &self,
        service: Service,
        settings: &ServiceSettings,
        target: &Arc<Entity>,
        items: Vec<Value>,
        batch: &[Arc<Entity>],
    ) {
        if items.is_empty() {
            return;
        }

        let candidates: Vec<MatchCandidate> = batch
            .iter()
            .filter(|other| !Arc::ptr_eq(other, target) && !other.is_disposed())
            .filter(|other| {
                matches!(
                    other.search_type(service),
                    SearchType::None | SearchType::NotFound
                )
            })
            .map(|other| candidate_of(other))
            .collect();
        if candidates.is_empty() {
            return;
        }

        let request = MatchRequest {
            service,
            result_items: items,
            candidates,
            origin: target.coordinates(),
            max_distance_meters: self.inner.config.match_max_distance_meters,
            min_confidence: self.inner.config.match_min_confidence,
            aliases: settings.match_aliases.clone(),
        };

        let this = self.clone();
        let settings = settings.clone();
        self.inner.tasks.spawn(async move {
            match this.inner.matcher.submit(request).await {
                Ok(matched) => {
                    for record in matched {
                        this.apply_incidental(service, &settings, &record);
                    }
                }
                Err(e) => warn!(%service, error = %e, "match worker failed"),
            }
        });
    }

    fn apply_incidental(&self, service: Service, settings: &ServiceSettings, record: &MatchedRecord) {
        let Some(entity) = self.inner.registry.find_by_provider_id(&record.provider_id) else {
            return;
        };
        if entity.is_disposed()
            || !matches!(
                entity.search_type(service),
                SearchType::None | SearchType::NotFound
            )
        {
            return;
        }
        self.apply_record(service, settings, &entity, &record.fields);
        entity.advance_search(service, SearchType::Basic);
        debug!(%service, provider_id = %record.provider_id, "matched from another venue's results");
    }

    fn fail(&self, service: Service, call_type: CallType, entity: &Arc<Entity>, error: ApiError) {
        let name = entity.display_name();
        warn!(
            %service,
            %call_type,
            provider_id = %entity.provider_id(),
            error = %error,
            "call failed"
        );

        match error.failure_kind() {
            FailureKind::Transport => {
                self.inner.notifications.transport_failure(service, &name);
            }
            FailureKind::Semantic => {
                self.inner.notifications.unreadable_response(service, &name);
            }
            FailureKind::Soft => {
                if matches!(error, ApiError::ZeroResults) {
                    if entity.advance_search(service, SearchType::NotFound) {
                        self.inner.notifications.no_match(service, &name);
                    }
                } else {
                    self.inner.notifications.rate_limited(service);
                }
            }
        }

        let discarded = self.inner.lock.dequeue_intercept(service, entity);
        if discarded > 0 {
            debug!(%service, discarded, "parked requests discarded after failure");
        }
    }

    fn replay(&self, parked: Vec<InterceptedCall>) {
        for call in parked {
            debug!(
                service = %call.service,
                call_type = %call.call_type,
                provider_id = %call.entity.provider_id(),
                "replaying parked request"
            );
            match call.call_type {
                CallType::Basic => {
                    self.request_basic(call.service, &call.entity);
                }
                CallType::Detailed => {
                    self.request_detailed(call.service, &call.entity);
                }
            }
        }
    }
}

fn candidate_of(entity: &Entity) -> MatchCandidate {
    MatchCandidate {
        provider_id: entity.provider_id().clone(),
        name: entity.display_name(),
        coordinates: entity.coordinates(),
    }
}

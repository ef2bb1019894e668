// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Venue coordination core
//!
//! Owns the venues discovered on the map and coordinates the calls that
//! enrich them from several review and business services.
//!
//! # Architecture
//!
//! - **Venues**: [`entity::Entity`] - reactive attribute slots per service, flags and lifetime
//! - **Registry**: [`registry::EntityRegistry`] - arrival order, provider-id index, bulk eviction
//! - **Field mapping**: [`mapping::FieldSchema`] - response fields to venue attributes, and back for persistence
//! - **Call tracking**: [`api_lock::ApiLock`] - at most one call per key, with intercepted detailed requests
//! - **Matching**: [`matching::MatchWorker`] - fuzzy name and distance matching off the runtime
//! - **Coordination**: [`orchestrator::Orchestrator`] - search, basic/detailed sequencing and delegation
//! - **Notifications**: [`notify::NotificationCenter`] - user-facing failure reports
//! - **Persistence**: [`persist::SnapshotWriter`] - throttled favorites and map view snapshots

pub mod api_lock;
pub mod config;
pub mod entity;
pub mod error;
pub mod generation;
pub mod mapping;
pub mod matching;
pub mod notify;
pub mod orchestrator;
pub mod persist;
pub mod registry;

pub use api_lock::{ApiLock, CallRecord, CallSummary, InterceptedCall};
pub use config::CoreConfig;
pub use entity::{
    AttributeSlot, Entity, EntityCallbacks, EntityFlags, ProviderId, ServiceState,
    TracingCallbacks,
};
pub use error::{CoreError, CoreResult};
pub use generation::{CallGenerations, Generation};
pub use mapping::{EntityBlueprint, FieldKind, FieldMapping, FieldSchema, ServiceBlueprint};
pub use matching::{MatchCandidate, MatchRequest, MatchWorker, MatchedRecord};
pub use notify::{Dismissal, Notification, NotificationCenter, NotificationKind};
pub use orchestrator::{
    DEFAULT_ZOOM, IngestSummary, Orchestrator, OrchestratorBuilder, RequestOutcome, SkipReason,
};
pub use persist::{FileSnapshotStore, MapView, SessionSnapshot, SnapshotWriter};
pub use registry::EntityRegistry;

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Venues and their per-service state
//!
//! An [`Entity`] is one venue discovered through the map provider. Its
//! position, name, flags, loading indicators and mapped attributes are
//! observable through `watch` channels; a subscriber also gets the venue's
//! lifetime token so it can stop listening once the venue is disposed.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Coordinates, SearchType, Service};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::mapping::{FieldKind, FieldSchema};

/// Identifier assigned by the map provider; the registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Wrap a provider identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Hooks into the presentation layer that owns a venue's marker
#[cfg_attr(test, mockall::automock)]
pub trait EntityCallbacks: Send + Sync {
    /// The venue became the selected one
    fn on_selected(&self, id: &ProviderId);
    /// The venue stopped being selected
    fn on_deselected(&self, id: &ProviderId);
    /// The venue was disposed; its marker must be released
    fn release_marker(&self, id: &ProviderId);
}

/// Callbacks that only log, used when no presentation layer is attached
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCallbacks;

impl EntityCallbacks for TracingCallbacks {
    fn on_selected(&self, id: &ProviderId) {
        debug!(provider_id = %id, "venue selected");
    }

    fn on_deselected(&self, id: &ProviderId) {
        debug!(provider_id = %id, "venue deselected");
    }

    fn release_marker(&self, id: &ProviderId) {
        debug!(provider_id = %id, "marker released");
    }
}

/// Boolean flags of a venue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFlags {
    /// Pinned by the user; never evicted and persisted across sessions
    pub is_favorite: bool,
    /// Shown in the result list
    pub is_listed: bool,
    /// Inside the current map viewport
    pub is_in_view_on_map: bool,
    /// The single venue whose details are open
    pub is_selected: bool,
}

/// Storage for one mapped attribute
#[derive(Debug)]
pub enum AttributeSlot {
    /// Not observable
    Plain(Mutex<Value>),
    /// Observable single value
    Scalar(watch::Sender<Value>),
    /// Observable ordered collection
    Collection(watch::Sender<Vec<Value>>),
}

impl AttributeSlot {
    /// Empty slot of the given kind
    pub fn new(kind: FieldKind) -> Self {
        match kind {
            FieldKind::None => Self::Plain(Mutex::new(Value::Null)),
            FieldKind::Scalar => Self::Scalar(watch::Sender::new(Value::Null)),
            FieldKind::Collection => Self::Collection(watch::Sender::new(Vec::new())),
        }
    }

    /// Kind of this slot
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Plain(_) => FieldKind::None,
            Self::Scalar(_) => FieldKind::Scalar,
            Self::Collection(_) => FieldKind::Collection,
        }
    }

    /// Current value; collections are returned as an array
    pub fn get(&self) -> Value {
        match self {
            Self::Plain(value) => value.lock().clone(),
            Self::Scalar(sender) => sender.borrow().clone(),
            Self::Collection(sender) => Value::Array(sender.borrow().clone()),
        }
    }

    /// Replace the value
    ///
    /// Collections take the elements of an array, nothing for `null` and wrap
    /// any other value.
    pub fn set(&self, value: Value) {
        match self {
            Self::Plain(slot) => *slot.lock() = value,
            Self::Scalar(sender) => {
                sender.send_replace(value);
            }
            Self::Collection(sender) => {
                let items = match value {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                sender.send_replace(items);
            }
        }
    }

    /// Subscribe to a scalar slot
    pub fn subscribe_scalar(&self) -> Option<watch::Receiver<Value>> {
        match self {
            Self::Scalar(sender) => Some(sender.subscribe()),
            _ => None,
        }
    }

    /// Subscribe to a collection slot
    pub fn subscribe_collection(&self) -> Option<watch::Receiver<Vec<Value>>> {
        match self {
            Self::Collection(sender) => Some(sender.subscribe()),
            _ => None,
        }
    }
}

/// Enrichment state of one venue on one service
#[derive(Debug)]
pub struct ServiceState {
    search_type: Mutex<SearchType>,
    is_loading: watch::Sender<bool>,
    attributes: BTreeMap<String, AttributeSlot>,
}

impl ServiceState {
    /// State with the given attribute slots and nothing fetched
    pub fn new(attributes: BTreeMap<String, AttributeSlot>) -> Self {
        Self {
            search_type: Mutex::new(SearchType::None),
            is_loading: watch::Sender::new(false),
            attributes,
        }
    }

    /// Attribute slot by entity field name
    pub fn slot(&self, field: &str) -> Option<&AttributeSlot> {
        self.attributes.get(field)
    }

    /// All attribute slots by entity field name
    pub fn slots(&self) -> impl Iterator<Item = (&str, &AttributeSlot)> {
        self.attributes.iter().map(|(name, slot)| (name.as_str(), slot))
    }
}

/// A venue
pub struct Entity {
    provider_id: ProviderId,
    sequence_number: u64,
    coordinates: watch::Sender<Coordinates>,
    display_name: watch::Sender<String>,
    flags: watch::Sender<EntityFlags>,
    services: [ServiceState; Service::COUNT],
    callbacks: Arc<dyn EntityCallbacks>,
    lifetime: CancellationToken,
    released: AtomicBool,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("provider_id", &self.provider_id)
            .field("sequence_number", &self.sequence_number)
            .field("display_name", &*self.display_name.borrow())
            .field("flags", &*self.flags.borrow())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl Entity {
    /// Create a venue with empty attribute slots laid out by `schema`
    pub fn new(
        provider_id: ProviderId,
        sequence_number: u64,
        coordinates: Coordinates,
        display_name: impl Into<String>,
        schema: &FieldSchema,
        callbacks: Arc<dyn EntityCallbacks>,
    ) -> Self {
        Self {
            provider_id,
            sequence_number,
            coordinates: watch::Sender::new(coordinates),
            display_name: watch::Sender::new(display_name.into()),
            flags: watch::Sender::new(EntityFlags::default()),
            services: [
                schema.construct(Service::Google),
                schema.construct(Service::Yelp),
                schema.construct(Service::Foursquare),
                schema.construct(Service::Locu),
            ],
            callbacks,
            lifetime: CancellationToken::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Provider identifier
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Creation order; lower numbers are older
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Current position
    pub fn coordinates(&self) -> Coordinates {
        *self.coordinates.borrow()
    }

    /// Move the venue
    pub fn set_coordinates(&self, coordinates: Coordinates) {
        self.coordinates.send_if_modified(|current| {
            let changed = *current != coordinates;
            *current = coordinates;
            changed
        });
    }

    /// Observe the position
    pub fn subscribe_coordinates(&self) -> watch::Receiver<Coordinates> {
        self.coordinates.subscribe()
    }

    /// Current display name
    pub fn display_name(&self) -> String {
        self.display_name.borrow().clone()
    }

    /// Rename the venue
    pub fn set_display_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.display_name.send_if_modified(|current| {
            if *current == name {
                false
            } else {
                *current = name;
                true
            }
        });
    }

    /// Observe the display name
    pub fn subscribe_display_name(&self) -> watch::Receiver<String> {
        self.display_name.subscribe()
    }

    /// Current flags
    pub fn flags(&self) -> EntityFlags {
        *self.flags.borrow()
    }

    /// Modify the flags; subscribers are notified only on change
    pub fn update_flags(&self, modify: impl FnOnce(&mut EntityFlags)) {
        self.flags.send_if_modified(|flags| {
            let before = *flags;
            modify(flags);
            before != *flags
        });
    }

    /// Observe the flags
    pub fn subscribe_flags(&self) -> watch::Receiver<EntityFlags> {
        self.flags.subscribe()
    }

    /// Whether the venue is pinned
    pub fn is_favorite(&self) -> bool {
        self.flags().is_favorite
    }

    /// State of one service
    pub fn service(&self, service: Service) -> &ServiceState {
        &self.services[service.index()]
    }

    /// Enrichment progress on `service`
    pub fn search_type(&self, service: Service) -> SearchType {
        *self.service(service).search_type.lock()
    }

    /// Move forward to `next`; returns `false` when that would regress
    pub fn advance_search(&self, service: Service, next: SearchType) -> bool {
        let mut current = self.service(service).search_type.lock();
        if current.can_advance_to(next) {
            debug!(
                provider_id = %self.provider_id,
                %service,
                from = %*current,
                to = %next,
                "search type advanced"
            );
            *current = next;
            true
        } else {
            false
        }
    }

    /// Overwrite the progress on `service`, forwards or backwards
    pub fn reset_search(&self, service: Service, state: SearchType) {
        *self.service(service).search_type.lock() = state;
    }

    /// Whether a call for `service` is in flight
    pub fn is_loading(&self, service: Service) -> bool {
        *self.service(service).is_loading.borrow()
    }

    /// Set the loading indicator of `service`
    pub fn set_loading(&self, service: Service, loading: bool) {
        self.service(service).is_loading.send_if_modified(|current| {
            let changed = *current != loading;
            *current = loading;
            changed
        });
    }

    /// Observe the loading indicator of `service`
    pub fn subscribe_loading(&self, service: Service) -> watch::Receiver<bool> {
        self.service(service).is_loading.subscribe()
    }

    /// Current value of a mapped attribute
    pub fn attribute(&self, service: Service, field: &str) -> Option<Value> {
        self.service(service).slot(field).map(AttributeSlot::get)
    }

    /// A mapped attribute as a non-empty string; numbers are rendered
    pub fn attribute_string(&self, service: Service, field: &str) -> Option<String> {
        match self.attribute(service, field)? {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Non-null attributes of `service`
    pub fn attributes(&self, service: Service) -> BTreeMap<String, Value> {
        self.service(service)
            .slots()
            .map(|(name, slot)| (name.to_string(), slot.get()))
            .filter(|(_, value)| !value.is_null())
            .collect()
    }

    /// Presentation hooks of this venue
    pub fn callbacks(&self) -> &Arc<dyn EntityCallbacks> {
        &self.callbacks
    }

    /// Token cancelled when the venue is disposed
    pub fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    /// Whether [`Self::dispose`] ran
    pub fn is_disposed(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Cancel subscriptions and release the marker
    ///
    /// Returns `false` if the venue was already disposed.
    pub fn dispose(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.lifetime.cancel();
        self.callbacks.release_marker(&self.provider_id);
        debug!(provider_id = %self.provider_id, "venue disposed");
        true
    }
}

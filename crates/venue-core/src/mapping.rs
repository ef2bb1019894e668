// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Field mapping between service responses and venue attributes
//!
//! A [`FieldSchema`] lists, per service, which response field feeds which
//! venue attribute and how that attribute is stored. The same tables drive
//! slot construction, partial updates and the plain snapshot used for
//! persistence.

use std::collections::BTreeMap;

use api_client::ResponsePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Coordinates, SearchType, Service};
use tracing::trace;

use crate::entity::{AttributeSlot, Entity, EntityFlags, ProviderId, ServiceState};

/// How a mapped attribute is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Plain value, not observable
    None,
    /// Observable single value
    Scalar,
    /// Observable ordered collection
    Collection,
}

/// One response field to venue attribute mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Dotted path into the service response
    pub server_field: ResponsePath,
    /// Attribute name on the venue
    pub entity_field: String,
    /// Storage kind
    pub kind: FieldKind,
}

impl FieldMapping {
    /// Mapping from a dotted response path
    pub fn new(server_field: &str, entity_field: &str, kind: FieldKind) -> Self {
        Self {
            server_field: ResponsePath::parse(server_field),
            entity_field: entity_field.to_string(),
            kind,
        }
    }
}

/// Mapping tables for every service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    tables: [Vec<FieldMapping>; Service::COUNT],
}

/// Plain snapshot of one service's state on a venue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceBlueprint {
    /// Enrichment progress
    pub search_type: SearchType,
    /// Non-null attribute values
    pub attributes: BTreeMap<String, Value>,
}

/// Plain, serializable snapshot of a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBlueprint {
    /// Provider identifier
    pub provider_id: ProviderId,
    /// Display name
    pub display_name: String,
    /// Last known position
    pub coordinates: Coordinates,
    /// Flags
    pub flags: EntityFlags,
    /// Per-service state
    pub services: BTreeMap<Service, ServiceBlueprint>,
}

fn table(mappings: &[(&str, &str, FieldKind)]) -> Vec<FieldMapping> {
    mappings
        .iter()
        .map(|(server, entity, kind)| FieldMapping::new(server, entity, *kind))
        .collect()
}

impl FieldSchema {
    /// Schema without any mappings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table of one service
    #[must_use]
    pub fn with_table(mut self, service: Service, mappings: Vec<FieldMapping>) -> Self {
        self.tables[service.index()] = mappings;
        self
    }

    /// Mappings of `service`
    pub fn table(&self, service: Service) -> &[FieldMapping] {
        &self.tables[service.index()]
    }

    /// Default tables for Google, Yelp, Foursquare and Locu
    pub fn standard() -> Self {
        use FieldKind::{Collection, None, Scalar};

        Self::new()
            .with_table(
                Service::Google,
                table(&[
                    ("place_id", "googleId", None),
                    ("vicinity", "vicinity", Scalar),
                    ("formatted_address", "address", Scalar),
                    ("formatted_phone_number", "phone", Scalar),
                    ("website", "website", Scalar),
                    ("rating", "rating", Scalar),
                    ("price_level", "priceLevel", Scalar),
                    ("opening_hours.open_now", "openNow", Scalar),
                    ("opening_hours.weekday_text", "hours", Collection),
                    ("types", "types", Collection),
                    ("photos", "photos", Collection),
                ]),
            )
            .with_table(
                Service::Yelp,
                table(&[
                    ("id", "yelpId", None),
                    ("url", "yelpUrl", Scalar),
                    ("rating", "yelpRating", Scalar),
                    ("review_count", "yelpReviewCount", Scalar),
                    ("price", "yelpPrice", Scalar),
                    ("image_url", "yelpImage", Scalar),
                    ("categories", "yelpCategories", Collection),
                    ("photos", "yelpPhotos", Collection),
                ]),
            )
            .with_table(
                Service::Foursquare,
                table(&[
                    ("id", "foursquareId", None),
                    ("canonicalUrl", "foursquareUrl", Scalar),
                    ("rating", "foursquareRating", Scalar),
                    ("stats.checkinsCount", "foursquareCheckins", Scalar),
                    ("categories", "foursquareCategories", Collection),
                    ("tips.groups.0.items", "foursquareTips", Collection),
                ]),
            )
            .with_table(
                Service::Locu,
                table(&[
                    ("id", "locuId", None),
                    ("website_url", "locuWebsite", Scalar),
                    ("phone", "locuPhone", Scalar),
                    ("menus", "locuMenus", Collection),
                ]),
            )
    }

    /// Build empty attribute slots for a new venue
    pub fn construct(&self, service: Service) -> ServiceState {
        let slots = self
            .table(service)
            .iter()
            .map(|mapping| (mapping.entity_field.clone(), AttributeSlot::new(mapping.kind)))
            .collect();
        ServiceState::new(slots)
    }

    /// Write the fields present in `response`; absent fields are untouched
    ///
    /// An explicit `null` counts as present. Returns the number of attributes written.
    pub fn update(&self, entity: &Entity, service: Service, response: &Value) -> usize {
        let state = entity.service(service);
        let mut written = 0;

        for mapping in self.table(service) {
            let Some(value) = mapping.server_field.resolve(response) else {
                continue;
            };
            if let Some(slot) = state.slot(&mapping.entity_field) {
                slot.set(value.clone());
                written += 1;
            }
        }

        trace!(provider_id = %entity.provider_id(), %service, written, "attributes updated");
        written
    }

    /// Plain snapshot of a venue
    pub fn deconstruct(&self, entity: &Entity) -> EntityBlueprint {
        let services = Service::all()
            .iter()
            .map(|&service| {
                (
                    service,
                    ServiceBlueprint {
                        search_type: entity.search_type(service),
                        attributes: entity.attributes(service),
                    },
                )
            })
            .collect();

        EntityBlueprint {
            provider_id: entity.provider_id().clone(),
            display_name: entity.display_name(),
            coordinates: entity.coordinates(),
            flags: entity.flags(),
            services,
        }
    }

    /// Restore a snapshot onto `entity`
    ///
    /// The position is always taken from `resolved`. Attributes without a slot
    /// in this schema are dropped.
    pub fn rebuild(&self, entity: &Entity, blueprint: &EntityBlueprint, resolved: Coordinates) {
        entity.set_coordinates(resolved);
        entity.set_display_name(blueprint.display_name.clone());
        let flags = blueprint.flags;
        entity.update_flags(|current| *current = flags);

        for (&service, saved) in &blueprint.services {
            let state = entity.service(service);
            for (field, value) in &saved.attributes {
                if let Some(slot) = state.slot(field) {
                    slot.set(value.clone());
                }
            }
            entity.reset_search(service, saved.search_type);
        }
    }
}

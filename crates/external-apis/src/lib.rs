// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Map provider and venue enrichment API integrations
//!
//! This crate talks to the outside world: the Google Places web service that
//! discovers venues, and the review/business services (Yelp, Foursquare, Locu)
//! that enrich them through the edge proxy.
//!
//! # Architecture
//!
//! - **Map provider**: [`places::PlacesClient`] - nearby search with pagination and place details
//! - **Settings table**: [`settings::ServiceSettings`] - one data-driven entry per enrichment service
//! - **Service registry**: [`registry::ServiceRegistry`] - the enabled subset of the table
//! - **Enrichment calls**: [`enrichment::EnrichmentClient`] - proxied basic and detailed requests
//! - **Validation Utilities**: [`non_empty_string::NonEmptyString`] - ensures non-empty string constraints

pub mod enrichment;
pub mod non_empty_string;
pub mod places;
pub mod registry;
pub mod settings;

pub use enrichment::*;
pub use non_empty_string::NonEmptyString;
pub use places::*;
pub use registry::*;
pub use settings::*;

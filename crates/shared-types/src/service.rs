// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Data source identifiers
//!
//! The set of services is closed: the map provider under a reserved key plus the
//! enrichment services every venue can be looked up on. Per-service state is kept
//! in fixed-size arrays indexed by [`Service::index`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::SearchType;

/// External data sources a venue can be enriched from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Google Places, the map provider (reserved key)
    Google,
    /// Yelp Fusion reviews
    Yelp,
    /// Foursquare venues and check-ins
    Foursquare,
    /// Locu menus
    Locu,
}

impl Service {
    /// Number of services, the length of every per-service array
    pub const COUNT: usize = 4;

    /// Position of this service in per-service arrays
    pub const fn index(self) -> usize {
        match self {
            Self::Google => 0,
            Self::Yelp => 1,
            Self::Foursquare => 2,
            Self::Locu => 3,
        }
    }

    /// Lower-case identifier used in URLs, config keys and proxy placeholders
    pub const fn name(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Yelp => "yelp",
            Self::Foursquare => "foursquare",
            Self::Locu => "locu",
        }
    }

    /// Human-readable name used in notifications
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Yelp => "Yelp",
            Self::Foursquare => "Foursquare",
            Self::Locu => "Locu",
        }
    }

    /// All services in index order
    pub const fn all() -> &'static [Self] {
        &[Self::Google, Self::Yelp, Self::Foursquare, Self::Locu]
    }

    /// Services that follow the basic/detailed enrichment flow
    pub const fn enrichment() -> &'static [Self] {
        &[Self::Yelp, Self::Foursquare, Self::Locu]
    }

    /// Whether this is the map provider key shared with the call tracker
    pub const fn is_map_provider(self) -> bool {
        matches!(self, Self::Google)
    }

    /// The search state reached once a detailed call for this service succeeds
    pub const fn detail_state(self) -> SearchType {
        match self {
            Self::Google => SearchType::Places,
            Self::Yelp => SearchType::Business,
            Self::Foursquare => SearchType::Venue,
            Self::Locu => SearchType::Search,
        }
    }

    /// Service at the given array position
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Google),
            1 => Some(Self::Yelp),
            2 => Some(Self::Foursquare),
            3 => Some(Self::Locu),
            _ => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when parsing an unknown service name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown service: {0}")]
pub struct ServiceParseError(pub String);

impl FromStr for Service {
    type Err = ServiceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" | "places" => Ok(Self::Google),
            "yelp" => Ok(Self::Yelp),
            "foursquare" | "4sq" => Ok(Self::Foursquare),
            "locu" => Ok(Self::Locu),
            _ => Err(ServiceParseError(s.to_string())),
        }
    }
}

/// Kind of enrichment call
///
/// A basic call is a proximity search returning a result collection; a detailed
/// call fetches one record by the identifier the basic call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Location-proximity search
    Basic,
    /// Fetch by service identifier
    Detailed,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Enrichment progress per venue and service

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How far enrichment has progressed for one service on one venue
///
/// States only move forward (see [`SearchType::can_advance_to`]); going back
/// requires an explicit reset. Each service reaches exactly one detail state,
/// given by [`crate::Service::detail_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
pub enum SearchType {
    /// Nothing fetched yet
    #[default]
    None,
    /// The proximity search found no acceptable match
    NotFound,
    /// Matched by a basic search; the service identifier is known
    Basic,
    /// Google place details loaded
    Places,
    /// Yelp business details loaded
    Business,
    /// Foursquare venue details loaded
    Venue,
    /// Locu venue details loaded
    Search,
}

impl SearchType {
    const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::NotFound => 1,
            Self::Basic => 2,
            Self::Places | Self::Business | Self::Venue | Self::Search => 3,
        }
    }

    /// Whether nothing has been fetched yet
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether this is one of the detail states
    pub const fn is_detailed(self) -> bool {
        self.rank() == 3
    }

    /// Whether moving from `self` to `next` is a forward transition
    pub const fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }

    /// Label used in API responses and logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::NotFound => "NotFound",
            Self::Basic => "Basic",
            Self::Places => "Places",
            Self::Business => "Business",
            Self::Venue => "Venue",
            Self::Search => "Search",
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

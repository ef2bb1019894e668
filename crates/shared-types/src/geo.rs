// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Geographic primitives

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// A WGS84 point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl Coordinates {
    /// Create a point from latitude and longitude
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_meters(&self, other: &Self) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }

    /// `"lat,lng"` as expected by most location query parameters
    pub fn to_query_value(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }
}

/// An axis-aligned latitude/longitude box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Bounds {
    /// South-west corner
    pub south_west: Coordinates,
    /// North-east corner
    pub north_east: Coordinates,
}

impl Bounds {
    /// Box of half-width `radius_meters` centred on `center`
    pub fn around(center: Coordinates, radius_meters: f64) -> Self {
        let d_lat = radius_meters / METERS_PER_DEGREE_LAT;
        let lng_scale = center.lat.to_radians().cos().abs().max(1e-6);
        let d_lng = radius_meters / (METERS_PER_DEGREE_LAT * lng_scale);

        Self {
            south_west: Coordinates::new(center.lat - d_lat, center.lng - d_lng),
            north_east: Coordinates::new(center.lat + d_lat, center.lng + d_lng),
        }
    }

    /// Whether the point lies inside the box (edges inclusive)
    pub fn contains(&self, point: &Coordinates) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&point.lng)
    }

    /// Centre of the box
    pub fn center(&self) -> Coordinates {
        Coordinates::new(
            f64::midpoint(self.south_west.lat, self.north_east.lat),
            f64::midpoint(self.south_west.lng, self.north_east.lng),
        )
    }

    /// `"sw_lat,sw_lng|ne_lat,ne_lng"`
    pub fn to_query_value(&self) -> String {
        format!(
            "{}|{}",
            self.south_west.to_query_value(),
            self.north_east.to_query_value()
        )
    }
}

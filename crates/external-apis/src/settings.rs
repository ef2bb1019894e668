// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-service enrichment settings
//!
//! Every enrichment service is described by data rather than code: where its
//! basic and detailed endpoints live, how to build their query parameters,
//! where the useful payload sits in the response and how the match worker reads
//! names and positions out of a result item. Credentials are never present here,
//! only proxy placeholders.

use std::{fmt, time::Duration};

use api_client::{ResponsePath, credential_placeholder};
use serde::{Deserialize, Serialize};
use shared_types::{Bounds, Coordinates, Service};

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Default radius around a venue within which a service record may match it
pub const DEFAULT_ACCURACY_RADIUS_METERS: f64 = 150.0;

/// Inputs available to the parameter builders
#[derive(Debug, Clone, Copy)]
pub struct ParamContext<'a> {
    /// Venue position
    pub coordinates: Coordinates,
    /// Search region around the venue
    pub region: Bounds,
    /// Search radius in meters
    pub radius_meters: f64,
    /// Venue display name
    pub name: &'a str,
    /// Identifier on this service, known after a basic match
    pub service_id: Option<&'a str>,
}

impl<'a> ParamContext<'a> {
    /// Context for a proximity search around `coordinates`
    pub fn around(coordinates: Coordinates, radius_meters: f64, name: &'a str) -> Self {
        Self {
            coordinates,
            region: Bounds::around(coordinates, radius_meters),
            radius_meters,
            name,
            service_id: None,
        }
    }

    /// Attach the service identifier for a detailed call
    pub fn with_service_id(mut self, service_id: &'a str) -> Self {
        self.service_id = Some(service_id);
        self
    }
}

/// Builds query parameters for one call type
pub type ParamsBuilder = fn(&ParamContext<'_>) -> Vec<(String, String)>;

/// Where the match worker finds identity fields inside a result item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAliases {
    /// Record identifier
    pub id: ResponsePath,
    /// Display name
    pub name: ResponsePath,
    /// Latitude
    pub lat: ResponsePath,
    /// Longitude
    pub lng: ResponsePath,
}

impl FieldAliases {
    /// Aliases from dotted path strings
    pub fn new(id: &str, name: &str, lat: &str, lng: &str) -> Self {
        Self {
            id: ResponsePath::parse(id),
            name: ResponsePath::parse(name),
            lat: ResponsePath::parse(lat),
            lng: ResponsePath::parse(lng),
        }
    }
}

/// Description of one enrichment service
#[derive(Clone)]
pub struct ServiceSettings {
    /// Which service this describes
    pub service: Service,
    /// API root, joined with the paths below
    pub base_url: String,
    /// Path of the proximity search endpoint
    pub basic_path: String,
    /// Path prefix of the fetch-by-id endpoint; the id is appended
    pub detailed_path: String,
    /// Query parameters of the basic call
    pub basic_params: ParamsBuilder,
    /// Query parameters of the detailed call
    pub detailed_params: ParamsBuilder,
    /// Location of the result collection in a basic response
    pub basic_response_path: ResponsePath,
    /// Location of the record in a detailed response
    pub detailed_response_path: ResponsePath,
    /// Append `/` after the id in detailed URLs
    pub extra_path_slash: bool,
    /// Identity fields for the match worker
    pub match_aliases: FieldAliases,
    /// Entity attribute holding this service's identifier
    pub id_field: String,
    /// Headers sent with every call, placeholders included
    pub headers: Vec<(String, String)>,
    /// Per-call timeout
    pub timeout: Duration,
    /// Radius of the basic search region
    pub accuracy_radius_meters: f64,
}

impl fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSettings")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("basic_path", &self.basic_path)
            .field("detailed_path", &self.detailed_path)
            .field("basic_response_path", &self.basic_response_path)
            .field("detailed_response_path", &self.detailed_response_path)
            .field("extra_path_slash", &self.extra_path_slash)
            .field("id_field", &self.id_field)
            .field("timeout", &self.timeout)
            .field("accuracy_radius_meters", &self.accuracy_radius_meters)
            .finish_non_exhaustive()
    }
}

impl ServiceSettings {
    /// Standard settings for an enrichment service, `None` for the map provider
    pub fn standard(service: Service) -> Option<Self> {
        match service {
            Service::Google => None,
            Service::Yelp => Some(Self::yelp()),
            Service::Foursquare => Some(Self::foursquare()),
            Service::Locu => Some(Self::locu()),
        }
    }

    /// Yelp Fusion v3 business search and lookup
    pub fn yelp() -> Self {
        Self {
            service: Service::Yelp,
            base_url: "https://api.yelp.com/v3".to_string(),
            basic_path: "/businesses/search".to_string(),
            detailed_path: "/businesses/".to_string(),
            basic_params: yelp_basic_params,
            detailed_params: no_params,
            basic_response_path: ResponsePath::parse("businesses"),
            detailed_response_path: ResponsePath::root(),
            extra_path_slash: false,
            match_aliases: FieldAliases::new(
                "id",
                "name",
                "coordinates.latitude",
                "coordinates.longitude",
            ),
            id_field: "yelpId".to_string(),
            headers: vec![(
                "Authorization".to_string(),
                format!("Bearer {}", credential_placeholder(Service::Yelp, "apiKey")),
            )],
            timeout: DEFAULT_CALL_TIMEOUT,
            accuracy_radius_meters: DEFAULT_ACCURACY_RADIUS_METERS,
        }
    }

    /// Foursquare v2 venue search and lookup
    pub fn foursquare() -> Self {
        Self {
            service: Service::Foursquare,
            base_url: "https://api.foursquare.com/v2".to_string(),
            basic_path: "/venues/search".to_string(),
            detailed_path: "/venues/".to_string(),
            basic_params: foursquare_basic_params,
            detailed_params: foursquare_auth_params,
            basic_response_path: ResponsePath::parse("response.venues"),
            detailed_response_path: ResponsePath::parse("response.venue"),
            extra_path_slash: false,
            match_aliases: FieldAliases::new("id", "name", "location.lat", "location.lng"),
            id_field: "foursquareId".to_string(),
            headers: Vec::new(),
            timeout: DEFAULT_CALL_TIMEOUT,
            accuracy_radius_meters: DEFAULT_ACCURACY_RADIUS_METERS,
        }
    }

    /// Locu v1 venue search and lookup
    pub fn locu() -> Self {
        Self {
            service: Service::Locu,
            base_url: "https://api.locu.com/v1_0".to_string(),
            basic_path: "/venue/search/".to_string(),
            detailed_path: "/venue/".to_string(),
            basic_params: locu_basic_params,
            detailed_params: locu_auth_params,
            basic_response_path: ResponsePath::parse("objects"),
            detailed_response_path: ResponsePath::parse("objects.0"),
            extra_path_slash: true,
            match_aliases: FieldAliases::new("id", "name", "lat", "long"),
            id_field: "locuId".to_string(),
            headers: Vec::new(),
            timeout: DEFAULT_CALL_TIMEOUT,
            accuracy_radius_meters: DEFAULT_ACCURACY_RADIUS_METERS,
        }
    }

    /// Point the service at another API root, e.g. a local mock
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the search region radius
    #[must_use]
    pub fn with_accuracy_radius(mut self, meters: f64) -> Self {
        self.accuracy_radius_meters = meters;
        self
    }

    /// Full URL of the basic call
    pub fn basic_url(&self) -> String {
        format!("{}{}", self.base_url, self.basic_path)
    }

    /// Full URL of the detailed call for `service_id`
    pub fn detailed_url(&self, service_id: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(service_id.as_bytes()).collect();
        let slash = if self.extra_path_slash { "/" } else { "" };
        format!("{}{}{}{}", self.base_url, self.detailed_path, encoded, slash)
    }
}

fn pair(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

fn no_params(_: &ParamContext<'_>) -> Vec<(String, String)> {
    Vec::new()
}

fn yelp_basic_params(ctx: &ParamContext<'_>) -> Vec<(String, String)> {
    vec![
        pair("term", ctx.name),
        pair("latitude", ctx.coordinates.lat.to_string()),
        pair("longitude", ctx.coordinates.lng.to_string()),
        pair("radius", format!("{}", ctx.radius_meters.round())),
        pair("categories", "restaurants"),
        pair("limit", "20"),
    ]
}

fn foursquare_auth_params(_: &ParamContext<'_>) -> Vec<(String, String)> {
    vec![
        pair(
            "client_id",
            credential_placeholder(Service::Foursquare, "clientId"),
        ),
        pair(
            "client_secret",
            credential_placeholder(Service::Foursquare, "clientSecret"),
        ),
        pair("v", "20160101"),
    ]
}

fn foursquare_basic_params(ctx: &ParamContext<'_>) -> Vec<(String, String)> {
    let mut params = vec![
        pair("intent", "browse"),
        pair("sw", ctx.region.south_west.to_query_value()),
        pair("ne", ctx.region.north_east.to_query_value()),
        pair("query", ctx.name),
        pair("limit", "20"),
    ];
    params.extend(foursquare_auth_params(ctx));
    params
}

fn locu_auth_params(_: &ParamContext<'_>) -> Vec<(String, String)> {
    vec![pair("api_key", credential_placeholder(Service::Locu, "apiKey"))]
}

fn locu_basic_params(ctx: &ParamContext<'_>) -> Vec<(String, String)> {
    let mut params = vec![
        pair("name", ctx.name),
        pair("location", ctx.coordinates.to_query_value()),
        pair("radius", format!("{}", ctx.radius_meters.round())),
    ];
    params.extend(locu_auth_params(ctx));
    params
}

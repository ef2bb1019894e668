// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Google Places web service integration
//!
//! The map provider is the source of truth for which venues exist. Nearby search
//! pages through restaurants around a point; place details fills in the Google
//! attributes of a single venue. The service answers HTTP 200 for most logical
//! errors and reports them in a `status` field, which is translated here.

use std::time::Duration;

use api_client::ApiError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use shared_types::Coordinates;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::NonEmptyString;

/// Venue type requested from nearby search
pub const NEARBY_PLACE_TYPE: &str = "restaurant";

/// Configuration for the Places client
#[derive(Debug, Clone)]
pub struct PlacesConfig {
    /// Base URL, without the `nearbysearch/json` or `details/json` suffix
    pub base_url: String,
    /// Server key
    pub api_key: NonEmptyString,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl PlacesConfig {
    /// Public endpoint
    pub const DEFAULT_BASE_URL: &'static str = "https://maps.googleapis.com/maps/api/place";

    /// Configuration against the public endpoint
    pub fn new(api_key: NonEmptyString) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            api_key,
            timeout_seconds: 60,
        }
    }
}

/// Errors specific to the Places client
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum PlacesError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP status
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// `ZERO_RESULTS`
    #[error("No places found")]
    ZeroResults,

    /// `OVER_QUERY_LIMIT`
    #[error("Query limit exceeded")]
    OverQueryLimit,

    /// `REQUEST_DENIED`
    #[error("Request denied: {message}")]
    RequestDenied { message: String },

    /// `INVALID_REQUEST`
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Any other status value
    #[error("Unexpected status: {status}")]
    UnknownStatus { status: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout { seconds: u64 },
}

impl From<PlacesError> for ApiError {
    fn from(value: PlacesError) -> Self {
        match value {
            PlacesError::Http(error) => ApiError::Http {
                message: error.to_string(),
            },
            PlacesError::Json(error) => ApiError::InvalidResponse {
                message: error.to_string(),
            },
            PlacesError::ApiError { status, message } => ApiError::ServiceUnavailable {
                message: format!("{status}: {message}"),
            },
            PlacesError::ZeroResults => ApiError::ZeroResults,
            PlacesError::OverQueryLimit => ApiError::RateLimitExceeded,
            PlacesError::RequestDenied { message } => ApiError::Authentication { message },
            PlacesError::InvalidRequest { message } => ApiError::Configuration { message },
            PlacesError::UnknownStatus { status } => ApiError::InvalidResponse {
                message: format!("unexpected status {status}"),
            },
            PlacesError::Config(message) => ApiError::Configuration { message },
            PlacesError::Timeout { seconds } => ApiError::Timeout {
                timeout_ms: seconds.saturating_mul(1000),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

/// One nearby search hit
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSummary {
    /// Provider identifier (`place_id`)
    pub place_id: String,
    /// Display name
    pub name: String,
    /// `geometry.location`
    pub location: Coordinates,
    /// The untouched result object, fed to field mapping
    pub raw: Value,
}

impl PlaceSummary {
    fn from_result(raw: Value) -> Option<Self> {
        let place_id = raw.get("place_id")?.as_str()?.to_string();
        let name = raw.get("name")?.as_str()?.to_string();
        let location = raw.get("geometry")?.get("location")?;
        let lat = location.get("lat")?.as_f64()?;
        let lng = location.get("lng")?.as_f64()?;

        Some(Self {
            place_id,
            name,
            location: Coordinates::new(lat, lng),
            raw,
        })
    }
}

/// One page of nearby search results
#[derive(Debug, Clone, Default)]
pub struct NearbyPage {
    /// Usable results, in provider order
    pub results: Vec<PlaceSummary>,
    /// Token for the following page, if any
    pub next_page_token: Option<String>,
}

/// Places API client implementation
#[derive(Debug)]
pub struct PlacesClient {
    client: Client,
    config: PlacesConfig,
}

impl PlacesClient {
    /// Create a new Places client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the base URL is blank
    pub fn new(config: PlacesConfig) -> Result<Self, PlacesError> {
        if config.base_url.trim().is_empty() {
            return Err(PlacesError::Config("Base URL cannot be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("venue-map/0.1.0")
            .build()
            .map_err(PlacesError::Http)?;

        Ok(Self { client, config })
    }

    /// Search for restaurants around `center`
    ///
    /// With a `page_token` only the token and key are sent, as the provider
    /// requires. Results missing an id, name or location are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-`OK` status
    pub async fn nearby_search(
        &self,
        center: Coordinates,
        radius_meters: f64,
        page_token: Option<&str>,
    ) -> Result<NearbyPage, PlacesError> {
        let url = format!("{}/nearbysearch/json", self.config.base_url);

        let mut query = vec![("key", self.config.api_key.as_str().to_string())];
        match page_token {
            Some(token) => query.push(("pagetoken", token.to_string())),
            None => {
                query.push(("location", center.to_query_value()));
                query.push(("radius", format!("{}", radius_meters.round())));
                query.push(("type", NEARBY_PLACE_TYPE.to_string()));
            }
        }

        debug!(url, has_page_token = page_token.is_some(), "nearby search");

        let body: NearbyResponse = self.get_json(&url, &query).await?;
        check_status(&body.status, body.error_message)?;

        let total = body.results.len();
        let results: Vec<PlaceSummary> = body
            .results
            .into_iter()
            .filter_map(PlaceSummary::from_result)
            .collect();
        if results.len() < total {
            warn!(
                skipped = total - results.len(),
                "nearby search returned incomplete results"
            );
        }

        Ok(NearbyPage {
            results,
            next_page_token: body.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    /// Fetch the details object of one place
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-`OK` status or a missing `result`
    pub async fn place_details(&self, place_id: &str) -> Result<Value, PlacesError> {
        if place_id.trim().is_empty() {
            return Err(PlacesError::Config("place id cannot be empty".to_string()));
        }

        let url = format!("{}/details/json", self.config.base_url);
        let query = [
            ("placeid", place_id.to_string()),
            ("key", self.config.api_key.as_str().to_string()),
        ];

        debug!(url, place_id, "place details");

        let body: DetailsResponse = self.get_json(&url, &query).await?;
        check_status(&body.status, body.error_message)?;

        body.result.ok_or_else(|| PlacesError::UnknownStatus {
            status: "OK without result".to_string(),
        })
    }

    async fn get_json<T>(&self, url: &str, query: &[(&str, String)]) -> Result<T, PlacesError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = self
            .client
            .get(url)
            .query(query)
            .header("accept", "application/json");

        let response = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request.send(),
        )
        .await
        .map_err(|_| PlacesError::Timeout {
            seconds: self.config.timeout_seconds,
        })?
        .map_err(PlacesError::Http)?;

        match response.status() {
            StatusCode::OK => {
                let text = response.text().await.map_err(PlacesError::Http)?;
                Ok(serde_json::from_str(&text)?)
            }
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!("Places API error: {} - {}", status.as_u16(), error_text);
                Err(PlacesError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }
}

/// Translate the provider's `status` field
fn check_status(status: &str, error_message: Option<String>) -> Result<(), PlacesError> {
    let message = || error_message.clone().unwrap_or_default();
    match status {
        "OK" => Ok(()),
        "ZERO_RESULTS" => Err(PlacesError::ZeroResults),
        "OVER_QUERY_LIMIT" => Err(PlacesError::OverQueryLimit),
        "REQUEST_DENIED" => Err(PlacesError::RequestDenied { message: message() }),
        "INVALID_REQUEST" => Err(PlacesError::InvalidRequest { message: message() }),
        other => Err(PlacesError::UnknownStatus {
            status: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use api_client::FailureKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn status_translation() {
        assert!(check_status("OK", None).is_ok());
        assert!(matches!(
            check_status("ZERO_RESULTS", None),
            Err(PlacesError::ZeroResults)
        ));
        assert!(matches!(
            check_status("OVER_QUERY_LIMIT", None),
            Err(PlacesError::OverQueryLimit)
        ));
        match check_status("REQUEST_DENIED", Some("bad key".to_string())) {
            Err(PlacesError::RequestDenied { message }) => assert_eq!(message, "bad key"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            check_status("UNKNOWN_ERROR", None),
            Err(PlacesError::UnknownStatus { .. })
        ));
    }

    #[test]
    fn soft_statuses_map_to_soft_failures() {
        let zero: ApiError = PlacesError::ZeroResults.into();
        let limit: ApiError = PlacesError::OverQueryLimit.into();
        assert!(matches!(zero, ApiError::ZeroResults));
        assert!(matches!(limit, ApiError::RateLimitExceeded));
        assert_eq!(zero.failure_kind(), FailureKind::Soft);

        let timeout: ApiError = PlacesError::Timeout { seconds: 60 }.into();
        assert!(matches!(timeout, ApiError::Timeout { timeout_ms: 60_000 }));
    }

    #[test]
    fn summary_requires_id_name_and_location() {
        let complete = json!({
            "place_id": "p1",
            "name": "Joe's Pizza",
            "geometry": {"location": {"lat": 40.73, "lng": -73.99}}
        });
        let summary = PlaceSummary::from_result(complete).unwrap();
        assert_eq!(summary.place_id, "p1");
        assert_eq!(summary.location, Coordinates::new(40.73, -73.99));

        let missing_geometry = json!({"place_id": "p2", "name": "Nowhere"});
        assert!(PlaceSummary::from_result(missing_geometry).is_none());
    }

    #[test]
    fn blank_base_url_is_rejected() {
        let mut config = PlacesConfig::new(NonEmptyString::new("key").unwrap());
        config.base_url = "  ".to_string();
        assert!(matches!(
            PlacesClient::new(config),
            Err(PlacesError::Config(_))
        ));
    }
}

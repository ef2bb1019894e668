// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Proxied enrichment calls
//!
//! [`EnrichmentClient`] turns a [`ServiceSettings`] entry into concrete HTTP
//! requests. The destination URL is built from the settings and then wrapped
//! by the edge proxy, so the only host this client ever talks to is the proxy.

use api_client::{ApiError, EdgeProxy};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared_types::{CallType, Service};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::{ParamContext, ServiceSettings};

/// Errors raised by enrichment calls
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum EnrichmentError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP status
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Credentials rejected by the service or the proxy
    #[error("Authentication failed")]
    Unauthorized,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error
    #[error("Request timeout after {millis} ms")]
    Timeout { millis: u64 },

    /// The configured response path did not lead to the expected payload
    #[error("{service} {call_type} response has nothing at `{path}`")]
    UnexpectedShape {
        service: Service,
        call_type: CallType,
        path: String,
    },
}

impl From<EnrichmentError> for ApiError {
    fn from(value: EnrichmentError) -> Self {
        match value {
            EnrichmentError::Http(error) => ApiError::Http {
                message: error.to_string(),
            },
            EnrichmentError::Json(error) => ApiError::InvalidResponse {
                message: error.to_string(),
            },
            EnrichmentError::ApiError { status, message } => ApiError::ServiceUnavailable {
                message: format!("{status}: {message}"),
            },
            EnrichmentError::RateLimited => ApiError::RateLimitExceeded,
            EnrichmentError::Unauthorized => ApiError::Authentication {
                message: value.to_string(),
            },
            EnrichmentError::Config(message) => ApiError::Configuration { message },
            EnrichmentError::Timeout { millis } => ApiError::Timeout { timeout_ms: millis },
            shape @ EnrichmentError::UnexpectedShape { .. } => ApiError::InvalidResponse {
                message: shape.to_string(),
            },
        }
    }
}

/// Issues basic and detailed calls through the edge proxy
#[derive(Debug, Clone)]
pub struct EnrichmentClient {
    client: Client,
    proxy: EdgeProxy,
}

impl EnrichmentClient {
    /// Create a new client addressing `proxy`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(proxy: EdgeProxy) -> Result<Self, EnrichmentError> {
        let client = Client::builder()
            .user_agent("venue-map/0.1.0")
            .build()
            .map_err(EnrichmentError::Http)?;

        Ok(Self { client, proxy })
    }

    /// The proxy every call goes through
    pub fn proxy(&self) -> &EdgeProxy {
        &self.proxy
    }

    /// Proximity search; returns the items at the basic response path
    ///
    /// # Errors
    ///
    /// Transport failures, non-success statuses, timeouts and a missing result
    /// collection are all errors
    pub async fn basic(
        &self,
        settings: &ServiceSettings,
        ctx: &ParamContext<'_>,
    ) -> Result<Vec<Value>, EnrichmentError> {
        let params = (settings.basic_params)(ctx);
        let body = self
            .fetch(settings, CallType::Basic, &settings.basic_url(), &params)
            .await?;

        settings
            .basic_response_path
            .resolve_array(&body)
            .cloned()
            .ok_or_else(|| EnrichmentError::UnexpectedShape {
                service: settings.service,
                call_type: CallType::Basic,
                path: settings.basic_response_path.to_string(),
            })
    }

    /// Fetch one record by the identifier in `ctx`
    ///
    /// # Errors
    ///
    /// As [`Self::basic`]; additionally a context without a service id is a
    /// configuration error
    pub async fn detailed(
        &self,
        settings: &ServiceSettings,
        ctx: &ParamContext<'_>,
    ) -> Result<Value, EnrichmentError> {
        let service_id = ctx.service_id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
            EnrichmentError::Config(format!(
                "{} detailed call without {}",
                settings.service, settings.id_field
            ))
        })?;

        let params = (settings.detailed_params)(ctx);
        let body = self
            .fetch(
                settings,
                CallType::Detailed,
                &settings.detailed_url(service_id),
                &params,
            )
            .await?;

        settings
            .detailed_response_path
            .resolve_object(&body)
            .cloned()
            .ok_or_else(|| EnrichmentError::UnexpectedShape {
                service: settings.service,
                call_type: CallType::Detailed,
                path: settings.detailed_response_path.to_string(),
            })
    }

    async fn fetch(
        &self,
        settings: &ServiceSettings,
        call_type: CallType,
        target: &str,
        params: &[(String, String)],
    ) -> Result<Value, EnrichmentError> {
        let target = EdgeProxy::target(target, params)
            .map_err(|e| EnrichmentError::Config(e.to_string()))?;
        let url: Url = self.proxy.wrap(&target);

        debug!(
            service = %settings.service,
            %call_type,
            target = %target,
            "enrichment call"
        );

        let mut request = self.client.get(url).header("accept", "application/json");
        for (name, value) in &settings.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let millis = u64::try_from(settings.timeout.as_millis()).unwrap_or(u64::MAX);
        let (status, text) = timeout(settings.timeout, async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        })
        .await
        .map_err(|_| EnrichmentError::Timeout { millis })?
        .map_err(EnrichmentError::Http)?;

        match status {
            StatusCode::OK => Ok(serde_json::from_str(&text)?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(EnrichmentError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(EnrichmentError::RateLimited),
            status => {
                warn!(
                    service = %settings.service,
                    "enrichment API error: {} - {}",
                    status.as_u16(),
                    text
                );
                Err(EnrichmentError::ApiError {
                    status: status.as_u16(),
                    message: text,
                })
            }
        }
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Edge proxy addressing
//!
//! Third-party APIs are never called directly. Every request goes to a generic
//! forwarding proxy which receives the real destination as an encoded `url`
//! query parameter, checks it against an allowlist and substitutes credential
//! placeholders with server-held secrets.

use shared_types::Service;
use url::Url;

use crate::ApiError;

/// Query parameter carrying the encoded destination URL
pub const PROXY_TARGET_PARAM: &str = "url";

/// Placeholder the proxy swaps for a secret, e.g. `<<<yelp|||apiKey>>>`
pub fn credential_placeholder(service: Service, field: &str) -> String {
    format!("<<<{}|||{}>>>", service.name(), field)
}

/// Location of the forwarding proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeProxy {
    endpoint: Url,
}

impl EdgeProxy {
    /// Create a proxy address from its endpoint URL
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ApiError::Configuration {
            message: format!("invalid proxy endpoint {endpoint}: {e}"),
        })?;

        if endpoint.cannot_be_a_base() {
            return Err(ApiError::Configuration {
                message: format!("proxy endpoint {endpoint} cannot be a base URL"),
            });
        }

        Ok(Self { endpoint })
    }

    /// The proxy endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build the destination URL with its query parameters
    pub fn target(base: &str, params: &[(String, String)]) -> Result<Url, ApiError> {
        let mut target = Url::parse(base).map_err(|e| ApiError::Configuration {
            message: format!("invalid service URL {base}: {e}"),
        })?;

        if !params.is_empty() {
            let mut pairs = target.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        Ok(target)
    }

    /// Address `target` through the proxy
    pub fn wrap(&self, target: &Url) -> Url {
        let mut proxied = self.endpoint.clone();
        proxied
            .query_pairs_mut()
            .append_pair(PROXY_TARGET_PARAM, target.as_str());
        proxied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_format() {
        assert_eq!(
            credential_placeholder(Service::Yelp, "apiKey"),
            "<<<yelp|||apiKey>>>"
        );
        assert_eq!(
            credential_placeholder(Service::Foursquare, "clientSecret"),
            "<<<foursquare|||clientSecret>>>"
        );
    }

    #[test]
    fn wrap_encodes_target_as_query_param() {
        let proxy = EdgeProxy::new("https://edge.example.com/proxy").unwrap();
        let target = EdgeProxy::target(
            "https://api.yelp.com/v3/businesses/search",
            &[
                ("term".to_string(), "Joe's Pizza".to_string()),
                ("latitude".to_string(), "40.7".to_string()),
            ],
        )
        .unwrap();

        let proxied = proxy.wrap(&target);
        assert_eq!(proxied.path(), "/proxy");

        let forwarded: Vec<_> = proxied.query_pairs().collect();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].0, PROXY_TARGET_PARAM);

        let decoded = Url::parse(&forwarded[0].1).unwrap();
        assert_eq!(decoded.host_str(), Some("api.yelp.com"));
        let params: Vec<_> = decoded.query_pairs().into_owned().collect();
        assert!(params.contains(&("term".to_string(), "Joe's Pizza".to_string())));
    }

    #[test]
    fn invalid_endpoints_are_rejected() {
        assert!(matches!(
            EdgeProxy::new("not a url"),
            Err(ApiError::Configuration { .. })
        ));
        assert!(EdgeProxy::target("::", &[]).is_err());
    }
}

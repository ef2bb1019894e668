// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! Hierarchical configuration for the venue map server: HTTP binding, the
//! discovery core, the edge proxy, Google Places and each enrichment service.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use external_apis::{NonEmptyString, PlacesConfig, ServiceRegistry, ServiceSettings};
use serde::{Deserialize, Deserializer, Serialize, de};
use shared_types::Service;
use url::Url;
use venue_core::CoreConfig;

use crate::error::{ServerError, ServerResult};

/// Edge proxy used when none is configured
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787/proxy";

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// Create a safe default port for development
    pub const fn default_development() -> Self {
        Self {
            port: 3000,
            environment: Environment::Development,
        }
    }

    /// Create a safe testing port (port 0)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // Re-validated once the environment is known
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// A validated timeout duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutSeconds(Duration);

impl TimeoutSeconds {
    /// Create a new `TimeoutSeconds`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if timeout is 0 or greater than 300 seconds
    pub fn new(seconds: u64) -> Result<Self> {
        ensure!(seconds != 0, "timeout must be greater than 0");
        ensure!(seconds <= 300, "timeout cannot exceed 300");
        Ok(Self(Duration::from_secs(seconds)))
    }

    /// Create a safe default timeout (30 seconds)
    pub const fn default_value() -> Self {
        Self(Duration::from_secs(30))
    }

    /// Create a safe testing timeout (5 seconds)
    pub const fn testing() -> Self {
        Self(Duration::from_secs(5))
    }

    /// Get the timeout value
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for TimeoutSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Self::new(seconds).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Default for TimeoutSeconds {
    fn default() -> Self {
        Self::default_value()
    }
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

/// Google Places settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesSettings {
    /// Server key
    pub api_key: NonEmptyString,
    /// Base URL of the web service
    #[serde(default = "default_places_url")]
    pub base_url: String,
    /// Request timeout
    #[serde(default = "default_places_timeout")]
    pub timeout_seconds: TimeoutSeconds,
}

fn default_places_url() -> String {
    PlacesConfig::DEFAULT_BASE_URL.to_string()
}

fn default_places_timeout() -> TimeoutSeconds {
    TimeoutSeconds(Duration::from_secs(60))
}

impl PlacesSettings {
    /// Client configuration for these settings
    pub fn client_config(&self) -> PlacesConfig {
        PlacesConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout_seconds: self.timeout_seconds.value().as_secs(),
        }
    }
}

/// Per-service overrides of the built-in enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceToggle {
    /// Whether the service is contacted at all
    pub enabled: bool,
    /// Replacement for the public base URL
    pub base_url: Option<String>,
    /// Replacement for the core call timeout
    pub timeout_seconds: Option<TimeoutSeconds>,
}

impl Default for ServiceToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            timeout_seconds: None,
        }
    }
}

/// Enrichment services
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Yelp
    pub yelp: ServiceToggle,
    /// Foursquare
    pub foursquare: ServiceToggle,
    /// Locu
    pub locu: ServiceToggle,
}

impl EnrichmentSettings {
    /// Every service disabled
    pub fn none() -> Self {
        let off = ServiceToggle {
            enabled: false,
            ..ServiceToggle::default()
        };
        Self {
            yelp: off.clone(),
            foursquare: off.clone(),
            locu: off,
        }
    }

    /// Toggle of one service
    pub fn toggle(&self, service: Service) -> Option<&ServiceToggle> {
        match service {
            Service::Yelp => Some(&self.yelp),
            Service::Foursquare => Some(&self.foursquare),
            Service::Locu => Some(&self.locu),
            Service::Google => None,
        }
    }

    /// Mutable toggle of one service
    pub fn toggle_mut(&mut self, service: Service) -> Option<&mut ServiceToggle> {
        match service {
            Service::Yelp => Some(&mut self.yelp),
            Service::Foursquare => Some(&mut self.foursquare),
            Service::Locu => Some(&mut self.locu),
            Service::Google => None,
        }
    }
}

/// Server configuration for different environments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: IpAddr,
    /// Server port (validated for environment compatibility)
    pub port: ServerPort,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Environment type
    pub environment: Environment,
    /// Edge proxy every enrichment call goes through
    pub proxy_url: String,
    /// Where favorites and the map view are persisted; nothing is persisted when unset
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Discovery core tunables
    #[serde(default)]
    pub discovery: CoreConfig,
    /// Google Places
    pub places: PlacesSettings,
    /// Enrichment services
    #[serde(default)]
    pub services: EnrichmentSettings,
}

impl ServerConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        let config = Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with `SERVER_` prefix, `__` between nested keys
    ///    (`SERVER_PLACES__API_KEY`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3000)?
            .set_default("timeout_seconds", 30)?
            .set_default("environment", "development")?
            .set_default("proxy_url", DEFAULT_PROXY_URL)?
            .add_source(File::with_name("config.json").required(false))
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let config = config_builder.build()?;
        let mut server_config: Self = config.try_deserialize()?;

        server_config.port = ServerPort::new(server_config.port.value(), server_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(server_config)
    }

    /// Create configuration optimized for testing
    ///
    /// No enrichment service is enabled and upstreams point at localhost.
    pub fn for_testing(places_base_url: &str, proxy_url: &str) -> ServerResult<Self> {
        let api_key =
            NonEmptyString::new("test-key").map_err(|message| ServerError::Config { message })?;
        Ok(Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::testing(),
            timeout_seconds: TimeoutSeconds::testing(),
            environment: Environment::Testing,
            proxy_url: proxy_url.to_string(),
            snapshot_path: None,
            discovery: CoreConfig::default()
                .with_page_delay(Duration::ZERO)
                .with_call_timeout(Duration::from_secs(5)),
            places: PlacesSettings {
                api_key,
                base_url: places_base_url.to_string(),
                timeout_seconds: TimeoutSeconds::testing(),
            },
            services: EnrichmentSettings::none(),
        })
    }

    /// Check cross-field constraints the types cannot express
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` naming the first invalid setting.
    pub fn validate(&self) -> ServerResult<()> {
        let invalid = |message: String| ServerError::Config { message };

        Url::parse(&self.proxy_url)
            .map_err(|e| invalid(format!("proxy_url `{}` is invalid: {e}", self.proxy_url)))?;
        Url::parse(&self.places.base_url).map_err(|e| {
            invalid(format!(
                "places.base_url `{}` is invalid: {e}",
                self.places.base_url
            ))
        })?;
        for &service in Service::enrichment() {
            if let Some(base_url) = self
                .services
                .toggle(service)
                .and_then(|toggle| toggle.base_url.as_ref())
            {
                Url::parse(base_url).map_err(|e| {
                    invalid(format!("{service} base_url `{base_url}` is invalid: {e}"))
                })?;
            }
        }
        self.discovery.validate().map_err(|e| invalid(e.to_string()))
    }

    /// Registry of the enabled enrichment services with overrides applied
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if a service cannot be registered.
    pub fn service_registry(&self) -> ServerResult<ServiceRegistry> {
        let mut registry = ServiceRegistry::new();
        for &service in Service::enrichment() {
            let Some(toggle) = self.services.toggle(service) else {
                continue;
            };
            if !toggle.enabled {
                continue;
            }
            let Some(mut settings) = ServiceSettings::standard(service) else {
                continue;
            };
            if let Some(base_url) = &toggle.base_url {
                settings = settings.with_base_url(base_url.as_str());
            }
            if let Some(timeout) = toggle.timeout_seconds {
                settings = settings.with_timeout(timeout.value());
            }
            registry.register(settings).map_err(|e| ServerError::Config {
                message: e.to_string(),
            })?;
        }
        Ok(registry)
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

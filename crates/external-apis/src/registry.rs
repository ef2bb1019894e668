// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Registry of enabled enrichment services
//!
//! The orchestrator consults this table for every call; a service without an
//! entry is simply never contacted.

use shared_types::Service;
use tracing::debug;

use crate::ServiceSettings;

/// Enabled enrichment services, indexed by [`Service::index`]
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    settings: [Option<ServiceSettings>; Service::COUNT],
}

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum RegistryError {
    /// The map provider does not use the enrichment flow
    #[error("{service} cannot be registered as an enrichment service")]
    MapProvider { service: Service },

    /// No settings registered for the service
    #[error("{service} is not enabled")]
    NotEnabled { service: Service },
}

impl ServiceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard settings of every enrichment service
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for &service in Service::enrichment() {
            if let Some(settings) = ServiceSettings::standard(service) {
                registry.settings[service.index()] = Some(settings);
            }
        }
        registry
    }

    /// Register or replace the settings of one service
    ///
    /// # Errors
    ///
    /// Returns an error for the map provider key
    pub fn register(&mut self, settings: ServiceSettings) -> Result<(), RegistryError> {
        if settings.service.is_map_provider() {
            return Err(RegistryError::MapProvider {
                service: settings.service,
            });
        }
        debug!(service = %settings.service, base_url = settings.base_url, "registering service");
        let index = settings.service.index();
        self.settings[index] = Some(settings);
        Ok(())
    }

    /// Builder form of [`Self::register`]; map provider settings are ignored
    #[must_use]
    pub fn with(mut self, settings: ServiceSettings) -> Self {
        let _ = self.register(settings);
        self
    }

    /// Disable a service
    pub fn remove(&mut self, service: Service) -> Option<ServiceSettings> {
        self.settings[service.index()].take()
    }

    /// Settings of `service`, if enabled
    pub fn get(&self, service: Service) -> Option<&ServiceSettings> {
        self.settings[service.index()].as_ref()
    }

    /// Settings of `service`
    ///
    /// # Errors
    ///
    /// Returns an error when the service is not enabled
    pub fn require(&self, service: Service) -> Result<&ServiceSettings, RegistryError> {
        self.get(service)
            .ok_or(RegistryError::NotEnabled { service })
    }

    /// Enabled services in index order
    pub fn enabled(&self) -> Vec<Service> {
        self.settings
            .iter()
            .flatten()
            .map(|settings| settings.service)
            .collect()
    }

    /// Get the number of registered services
    pub fn client_count(&self) -> usize {
        self.settings.iter().flatten().count()
    }

    /// Get the names of all registered services
    pub fn client_names(&self) -> Vec<&'static str> {
        self.enabled().into_iter().map(Service::name).collect()
    }
}

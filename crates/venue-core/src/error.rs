// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for venue coordination

use api_client::ApiError;
use shared_types::Service;
use thiserror::Error;

use crate::ProviderId;

/// Result type alias for venue coordination operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the coordination core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid core configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No venue with this provider id is registered
    #[error("Unknown venue: {provider_id}")]
    UnknownEntity { provider_id: ProviderId },

    /// The service has no settings and is never contacted
    #[error("Service not enabled: {service}")]
    ServiceDisabled { service: Service },

    /// External call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Session snapshot could not be read or written
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Match worker panicked or was cancelled
    #[error("Match worker error: {message}")]
    Worker { message: String },

    /// Custom error with context
    #[error("Custom error: {0}")]
    Custom(#[from] anyhow::Error),
}

impl CoreError {
    /// Create a configuration error
    pub fn config<T: ToString>(message: T) -> Self {
        Self::Configuration {
            message: message.to_string(),
        }
    }

    /// Create an unknown venue error
    pub fn unknown_entity(provider_id: &ProviderId) -> Self {
        Self::UnknownEntity {
            provider_id: provider_id.clone(),
        }
    }

    /// Create a persistence error
    pub fn persistence<T: ToString>(message: T) -> Self {
        Self::Persistence {
            message: message.to_string(),
        }
    }

    /// Create a JSON error
    pub fn json<T: ToString>(message: T) -> Self {
        Self::Json {
            message: message.to_string(),
        }
    }

    /// Create a match worker error
    pub fn worker<T: ToString>(message: T) -> Self {
        Self::Worker {
            message: message.to_string(),
        }
    }

    /// Whether the caller referenced something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownEntity { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err)
    }
}

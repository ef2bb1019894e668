// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Generic API client errors and addressing utilities for external integrations
//!
//! This crate provides the abstractions shared by every outbound integration of the
//! venue map service.
//!
//! # Core Abstractions
//!
//! - **`ApiError`**: common error type every client-specific error converts into
//! - **`FailureKind`**: how a failure is surfaced and how the call tracker recovers
//! - **`ResponsePath`**: dotted-path unwrapping of nested JSON responses
//! - **`EdgeProxy`**: addressing of the forwarding proxy and credential placeholders

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod proxy;
pub mod types;

pub use proxy::*;
pub use types::*;

/// Broad classes of call failure
///
/// The class decides the user-facing copy and whether a failure is worth a
/// notification at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network error, timeout or non-success HTTP status
    Transport,
    /// Successful transport but the payload lacked the expected shape
    Semantic,
    /// Provider-specific condition with its own copy (zero results, rate limit)
    Soft,
}

/// Common errors that can occur when working with API clients
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {message}")]
    Http { message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider reported no results for the query
    #[error("No results")]
    ZeroResults,

    /// Authentication failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Invalid response format
    #[error("Invalid response format: {message}")]
    InvalidResponse { message: String },

    /// Service unavailable
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Network timeout
    #[error("Request timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Client independent error
    #[error(transparent)]
    Custom { error: anyhow::Error },
}

impl ApiError {
    /// Classify this error for recovery and user-facing reporting
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::InvalidResponse { .. } => FailureKind::Semantic,
            Self::RateLimitExceeded | Self::ZeroResults => FailureKind::Soft,
            Self::Http { .. }
            | Self::Authentication { .. }
            | Self::ServiceUnavailable { .. }
            | Self::Configuration { .. }
            | Self::Timeout { .. }
            | Self::Custom { .. } => FailureKind::Transport,
        }
    }

    /// Whether the call never produced a usable response
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

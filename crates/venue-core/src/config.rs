// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Tunables of the coordination core

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Configuration of the coordination core
///
/// Every field has a default so partial configuration files deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Registry size above which eviction runs
    pub eviction_cap: usize,
    /// Number of venues disposed per eviction pass
    pub eviction_bulk: usize,
    /// Radius of the region searched around a venue on enrichment services
    pub accuracy_radius_meters: f64,
    /// Maximum distance between a venue and a service record it matches
    pub match_max_distance_meters: f64,
    /// Minimum name similarity in `[0, 1]` for a match
    pub match_min_confidence: f64,
    /// Timeout of one external call
    pub call_timeout_ms: u64,
    /// Delay before requesting the next nearby search page
    pub page_delay_ms: u64,
    /// Lifetime of verbose notifications
    pub verbose_ttl_ms: u64,
    /// Minimum interval between session snapshot writes
    pub persist_interval_ms: u64,
    /// Radius used when a search does not specify one
    pub default_search_radius_meters: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            eviction_cap: 200,
            eviction_bulk: 20,
            accuracy_radius_meters: 150.0,
            match_max_distance_meters: 250.0,
            match_min_confidence: 0.5,
            call_timeout_ms: 60_000,
            page_delay_ms: 2_000,
            verbose_ttl_ms: 5_000,
            persist_interval_ms: 1_000,
            default_search_radius_meters: 1_000.0,
        }
    }
}

impl CoreConfig {
    /// Set the eviction cap and bulk amount
    #[must_use]
    pub fn with_eviction(mut self, cap: usize, bulk: usize) -> Self {
        self.eviction_cap = cap;
        self.eviction_bulk = bulk;
        self
    }

    /// Set the external call timeout
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the delay between nearby search pages
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the minimum interval between snapshot writes
    #[must_use]
    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// External call timeout
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay between nearby search pages
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Lifetime of verbose notifications
    pub fn verbose_ttl(&self) -> Duration {
        Duration::from_millis(self.verbose_ttl_ms)
    }

    /// Minimum interval between snapshot writes
    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.eviction_cap == 0 {
            return Err(CoreError::config("eviction_cap must be greater than 0"));
        }
        if self.eviction_bulk == 0 {
            return Err(CoreError::config("eviction_bulk must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.match_min_confidence) {
            return Err(CoreError::config(format!(
                "match_min_confidence must be within [0, 1], got {}",
                self.match_min_confidence
            )));
        }
        for (name, value) in [
            ("accuracy_radius_meters", self.accuracy_radius_meters),
            ("match_max_distance_meters", self.match_max_distance_meters),
            ("default_search_radius_meters", self.default_search_radius_meters),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CoreError::config(format!(
                    "{name} must be a positive distance, got {value}"
                )));
            }
        }
        if self.call_timeout_ms == 0 {
            return Err(CoreError::config("call_timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the venue map service
//!
//! This crate provides common types that are shared across multiple crates
//! in the workspace, avoiding circular dependencies.

pub mod geo;
pub mod search_type;
pub mod service;

pub use geo::{Bounds, Coordinates};
pub use search_type::SearchType;
pub use service::{CallType, Service, ServiceParseError};

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Fuzzy matching of service records to venues
//!
//! A basic call returns every record near one venue, and nearby venues
//! frequently appear among them. The orchestrator matches its target itself
//! and hands the remaining records to the [`MatchWorker`], which runs
//! [`run_match`] on a blocking thread with plain data only.

use std::sync::LazyLock;

use external_apis::FieldAliases;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Coordinates, Service};
use tracing::debug;

use crate::{
    entity::ProviderId,
    error::{CoreError, CoreResult},
};

static APOSTROPHES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"['’`]").ok());
static NON_ALPHANUMERIC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").ok());

/// Lower-case, drop apostrophes, turn other punctuation into spaces and collapse whitespace
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let without_apostrophes = match APOSTROPHES.as_ref() {
        Some(re) => re.replace_all(&lower, "").into_owned(),
        None => lower,
    };
    let spaced = match NON_ALPHANUMERIC.as_ref() {
        Some(re) => re.replace_all(&without_apostrophes, " ").into_owned(),
        None => without_apostrophes,
    };
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Jaro-Winkler similarity of two names after normalization, in `[0, 1]`
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&normalize_name(a), &normalize_name(b))
}

/// Index and score of the candidate most similar to `name`
///
/// Scores below `threshold` never match; ties go to the earlier candidate.
pub fn best_match(name: &str, candidates: &[&str], threshold: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = name_similarity(name, candidate);
        if score < threshold {
            continue;
        }
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best
}

/// A venue the worker may match records to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Venue identifier
    pub provider_id: ProviderId,
    /// Venue display name
    pub name: String,
    /// Venue position
    pub coordinates: Coordinates,
}

/// Work sent to the match worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    /// Service the records come from
    pub service: Service,
    /// Unclaimed records of a basic response
    pub result_items: Vec<Value>,
    /// Venues still waiting for a match on this service
    pub candidates: Vec<MatchCandidate>,
    /// Position the basic search was centred on, assumed for records without one
    pub origin: Coordinates,
    /// Records further than this from a venue never match it
    pub max_distance_meters: f64,
    /// Minimum name similarity
    pub min_confidence: f64,
    /// Where identity fields live in a record
    pub aliases: FieldAliases,
}

/// A record matched to a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRecord {
    /// Matched venue
    pub provider_id: ProviderId,
    /// The record, to be applied through field mapping
    pub fields: Value,
}

/// Position of a record, if it carries one
fn record_position(item: &Value, aliases: &FieldAliases) -> Option<Coordinates> {
    Some(Coordinates::new(
        aliases.lat.resolve_f64(item)?,
        aliases.lng.resolve_f64(item)?,
    ))
}

/// Index of the record best matching `candidate`, among those not yet `claimed`
///
/// Records further than `max_distance_meters` from the candidate are ignored.
/// A record without a position is taken to lie at `origin`, the point the
/// search was centred on.
pub fn match_candidate(
    candidate: &MatchCandidate,
    items: &[Value],
    claimed: &[bool],
    aliases: &FieldAliases,
    origin: Coordinates,
    max_distance_meters: f64,
    min_confidence: f64,
) -> Option<usize> {
    let eligible: Vec<(usize, String)> = items
        .iter()
        .enumerate()
        .filter(|(index, _)| !claimed.get(*index).copied().unwrap_or(false))
        .filter(|(_, item)| {
            record_position(item, aliases)
                .unwrap_or(origin)
                .distance_meters(&candidate.coordinates)
                <= max_distance_meters
        })
        .filter_map(|(index, item)| Some((index, aliases.name.resolve_string(item)?)))
        .collect();

    let names: Vec<&str> = eligible.iter().map(|(_, name)| name.as_str()).collect();
    best_match(&candidate.name, &names, min_confidence).map(|(position, _)| eligible[position].0)
}

/// Match records to candidates, each record claimed at most once
///
/// Candidates are served in order; each takes its best unclaimed record.
pub fn run_match(request: &MatchRequest) -> Vec<MatchedRecord> {
    let mut claimed = vec![false; request.result_items.len()];
    let mut matched = Vec::new();

    for candidate in &request.candidates {
        if let Some(index) = match_candidate(
            candidate,
            &request.result_items,
            &claimed,
            &request.aliases,
            request.origin,
            request.max_distance_meters,
            request.min_confidence,
        ) {
            claimed[index] = true;
            matched.push(MatchedRecord {
                provider_id: candidate.provider_id.clone(),
                fields: request.result_items[index].clone(),
            });
        }
    }

    matched
}

/// Runs match requests off the async runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchWorker;

impl MatchWorker {
    /// Match on a blocking worker thread
    pub async fn submit(&self, request: MatchRequest) -> CoreResult<Vec<MatchedRecord>> {
        let service = request.service;
        let items = request.result_items.len();
        let candidates = request.candidates.len();

        let matched = tokio::task::spawn_blocking(move || run_match(&request))
            .await
            .map_err(CoreError::worker)?;

        debug!(
            %service,
            items,
            candidates,
            matched = matched.len(),
            "match worker finished"
        );
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn yelp_aliases() -> FieldAliases {
        FieldAliases::new("id", "name", "coordinates.latitude", "coordinates.longitude")
    }

    fn candidate(id: &str, name: &str, lat: f64, lng: f64) -> MatchCandidate {
        MatchCandidate {
            provider_id: ProviderId::new(id),
            name: name.to_string(),
            coordinates: Coordinates::new(lat, lng),
        }
    }

    fn business(id: &str, name: &str, lat: f64, lng: f64) -> Value {
        json!({"id": id, "name": name, "coordinates": {"latitude": lat, "longitude": lng}})
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_name("Joe's  Pizza!"), "joes pizza");
        assert_eq!(normalize_name("Joes Pizza"), "joes pizza");
        assert_eq!(normalize_name("Café-Bar & Grill"), "café bar grill");
    }

    #[test]
    fn apostrophe_variants_match_above_half() {
        let result = best_match("Joe's Pizza", &["Joes Pizza"], 0.5);
        let (index, score) = result.unwrap();
        assert_eq!(index, 0);
        assert!(score >= 0.5);
    }

    #[test]
    fn best_match_prefers_highest_score() {
        let candidates = ["Pizza Hut", "Joe's Pizza Inc", "Joes Pizza"];
        let (index, _) = best_match("Joe's Pizza", &candidates, 0.5).unwrap();
        assert_eq!(index, 2);
        assert!(best_match("Joe's Pizza", &["Sushi Nakazawa"], 0.9).is_none());
    }

    #[test]
    fn run_match_claims_each_record_once() {
        let request = MatchRequest {
            service: Service::Yelp,
            result_items: vec![
                business("x", "Katz's Delicatessen", 40.7223, -73.9874),
                business("y", "Russ & Daughters", 40.7226, -73.9882),
            ],
            candidates: vec![
                candidate("p1", "Katz's Delicatessen", 40.7222, -73.9873),
                candidate("p2", "Katz Delicatessen", 40.7222, -73.9873),
                candidate("p3", "Russ and Daughters", 40.7225, -73.9881),
            ],
            origin: Coordinates::new(40.7222, -73.9873),
            max_distance_meters: 250.0,
            min_confidence: 0.8,
            aliases: yelp_aliases(),
        };

        let matched = run_match(&request);
        let ids: Vec<(&str, &Value)> = matched
            .iter()
            .map(|m| (m.provider_id.as_str(), &m.fields["id"]))
            .collect();
        assert_eq!(ids, vec![("p1", &json!("x")), ("p3", &json!("y"))]);
    }

    #[test]
    fn distant_records_are_ignored() {
        let items = vec![business("far", "Joes Pizza", 41.0, -74.5)];
        let target = candidate("p1", "Joe's Pizza", 40.73, -73.99);
        assert!(
            match_candidate(
                &target,
                &items,
                &[false],
                &yelp_aliases(),
                target.coordinates,
                250.0,
                0.5,
            )
            .is_none()
        );
    }

    #[test]
    fn records_without_position_sit_at_origin() {
        let request = MatchRequest {
            service: Service::Yelp,
            result_items: vec![
                json!({"id": "near", "name": "Joes Pizza"}),
                json!({"id": "far", "name": "Lombardi's"}),
            ],
            candidates: vec![
                candidate("p1", "Joe's Pizza", 40.7301, -73.9901),
                candidate("p2", "Lombardi's Pizza", 40.7216, -73.9956),
            ],
            origin: Coordinates::new(40.73, -73.99),
            max_distance_meters: 250.0,
            min_confidence: 0.5,
            aliases: yelp_aliases(),
        };

        let matched = run_match(&request);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].provider_id.as_str(), "p1");
        assert_eq!(matched[0].fields["id"], "near");
    }

    #[tokio::test]
    async fn worker_runs_off_runtime() {
        let request = MatchRequest {
            service: Service::Yelp,
            result_items: vec![business("a", "Joes Pizza", 40.7301, -73.9901)],
            candidates: vec![candidate("p1", "Joe's Pizza", 40.73, -73.99)],
            origin: Coordinates::new(40.73, -73.99),
            max_distance_meters: 250.0,
            min_confidence: 0.5,
            aliases: yelp_aliases(),
        };

        let matched = MatchWorker.submit(request).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].fields["id"], "a");
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for `Orchestrator` against a mock map provider and edge proxy

use std::{sync::Arc, time::Duration};

use external_apis::{ServiceRegistry, ServiceSettings};
use serde_json::json;
use shared_types::{Bounds, CallType, Coordinates, SearchType, Service};
use venue_core::{
    FileSnapshotStore, NotificationKind, ProviderId, RequestOutcome, SkipReason, SnapshotWriter,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate, Times,
    matchers::{method, path, query_param, query_param_is_missing},
};

use fixtures::*;

fn yelp_only() -> ServiceRegistry {
    ServiceRegistry::new().with(ServiceSettings::yelp())
}

async fn mount_yelp_search(
    server: &MockServer,
    body: serde_json::Value,
    delay: Duration,
    hits: impl Into<Times>,
) {
    Mock::given(method("GET"))
        .and(path(PROXY_PATH))
        .and(target_path_is("/v3/businesses/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
        .expect(hits)
        .mount(server)
        .await;
}

async fn mount_yelp_business(
    server: &MockServer,
    expected_path: &'static str,
    body: serde_json::Value,
    hits: u64,
) {
    Mock::given(method("GET"))
        .and(path(PROXY_PATH))
        .and(target_path_is(expected_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn detailed_request_waits_for_basic_match() {
    let server = MockServer::start().await;
    mount_yelp_search(
        &server,
        yelp_search(vec![yelp_business("a", "Joes Pizza", JOES)]),
        Duration::ZERO,
        1,
    )
    .await;
    mount_yelp_business(&server, "/v3/businesses/a", yelp_business("a", "Joes Pizza", JOES), 1).await;

    let orchestrator = orchestrator(&server, yelp_only());
    orchestrator.ingest(vec![summary("p1", "Joe's Pizza", JOES)]);
    let joes = orchestrator.entity(&ProviderId::new("p1")).unwrap();

    assert_eq!(
        orchestrator.request_detailed(Service::Yelp, &joes),
        RequestOutcome::Deferred
    );
    orchestrator.settle().await;

    assert_eq!(
        joes.attribute_string(Service::Yelp, "yelpId").as_deref(),
        Some("a")
    );
    assert_eq!(joes.attribute(Service::Yelp, "yelpRating"), Some(json!(4.0)));
    assert_eq!(joes.search_type(Service::Yelp), SearchType::Business);
    assert!(!joes.is_loading(Service::Yelp));
    assert!(orchestrator.active_calls().is_empty());
    assert!(orchestrator.queued_intercepts().is_empty());
}

#[tokio::test]
async fn repeated_requests_share_one_call() {
    let server = MockServer::start().await;
    mount_yelp_search(
        &server,
        yelp_search(vec![yelp_business("a", "Joes Pizza", JOES)]),
        Duration::from_millis(200),
        1,
    )
    .await;
    mount_yelp_business(&server, "/v3/businesses/a", yelp_business("a", "Joes Pizza", JOES), 1).await;

    let orchestrator = orchestrator(&server, yelp_only());
    orchestrator.ingest(vec![summary("p1", "Joe's Pizza", JOES)]);
    let joes = orchestrator.entity(&ProviderId::new("p1")).unwrap();

    assert_eq!(
        orchestrator.request_detailed(Service::Yelp, &joes),
        RequestOutcome::Deferred
    );
    assert_eq!(
        orchestrator.request_detailed(Service::Yelp, &joes),
        RequestOutcome::Deferred
    );
    assert_eq!(
        orchestrator.request_basic(Service::Yelp, &joes),
        RequestOutcome::AlreadyActive
    );

    let active = orchestrator.active_calls();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].call_type, CallType::Basic);
    assert_eq!(orchestrator.queued_intercepts().len(), 1);
    assert!(joes.is_loading(Service::Yelp));

    orchestrator.settle().await;
    assert_eq!(joes.search_type(Service::Yelp), SearchType::Business);
}

#[tokio::test]
async fn timeout_leaves_venue_retryable() {
    let server = MockServer::start().await;
    mount_yelp_search(
        &server,
        yelp_search(vec![yelp_business("a", "Joes Pizza", JOES)]),
        Duration::from_secs(2),
        1,
    )
    .await;

    let services =
        ServiceRegistry::new().with(ServiceSettings::yelp().with_timeout(Duration::from_millis(100)));
    let orchestrator = orchestrator(&server, services);
    orchestrator.ingest(vec![summary("p1", "Joe's Pizza", JOES)]);
    let joes = orchestrator.entity(&ProviderId::new("p1")).unwrap();

    orchestrator.request_detailed(Service::Yelp, &joes);
    orchestrator.settle().await;

    assert_eq!(joes.search_type(Service::Yelp), SearchType::None);
    assert!(!joes.is_loading(Service::Yelp));
    assert!(orchestrator.queued_intercepts().is_empty());
    assert_eq!(
        joes.attribute(Service::Yelp, "yelpId"),
        Some(serde_json::Value::Null)
    );
    assert!(joes.attribute_string(Service::Yelp, "yelpId").is_none());

    let notifications = orchestrator.notifications().active();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::TransportFailure);
    assert_eq!(notifications[0].service, Some(Service::Yelp));
}

#[tokio::test]
async fn unmatched_venue_is_marked_not_found() {
    let server = MockServer::start().await;
    // A kilometre away from the venue
    mount_yelp_search(
        &server,
        yelp_search(vec![yelp_business("s", "Sushi Nakazawa", (40.7390, -73.9900))]),
        Duration::ZERO,
        1,
    )
    .await;

    let orchestrator = orchestrator(&server, yelp_only());
    orchestrator.ingest(vec![summary("p1", "Joe's Pizza", JOES)]);
    let joes = orchestrator.entity(&ProviderId::new("p1")).unwrap();

    orchestrator.request_detailed(Service::Yelp, &joes);
    orchestrator.settle().await;

    assert_eq!(joes.search_type(Service::Yelp), SearchType::NotFound);
    assert!(orchestrator.queued_intercepts().is_empty());
    let notifications = orchestrator.notifications().active();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::NoMatch);
    assert!(notifications[0].expires_at.is_some());

    assert_eq!(
        orchestrator.request_detailed(Service::Yelp, &joes),
        RequestOutcome::Skipped(SkipReason::AlreadyResolved)
    );
}

#[tokio::test]
async fn leftover_records_match_other_venues() {
    let server = MockServer::start().await;
    mount_yelp_search(
        &server,
        yelp_search(vec![
            yelp_business("a", "Joes Pizza", JOES),
            yelp_business("k", "Katz's Delicatessen", KATZ),
        ]),
        Duration::ZERO,
        1,
    )
    .await;

    let orchestrator = orchestrator(&server, yelp_only());
    orchestrator.ingest(vec![
        summary("p1", "Joe's Pizza", JOES),
        summary("p2", "Katz's Delicatessen", KATZ),
    ]);
    let joes = orchestrator.entity(&ProviderId::new("p1")).unwrap();
    let katz = orchestrator.entity(&ProviderId::new("p2")).unwrap();

    assert_eq!(
        orchestrator.request_basic(Service::Yelp, &joes),
        RequestOutcome::Issued
    );
    orchestrator.settle().await;

    assert_eq!(
        joes.attribute_string(Service::Yelp, "yelpId").as_deref(),
        Some("a")
    );
    assert_eq!(
        katz.attribute_string(Service::Yelp, "yelpId").as_deref(),
        Some("k")
    );
    assert_eq!(katz.search_type(Service::Yelp), SearchType::Basic);
    assert!(!katz.is_loading(Service::Yelp));
}

#[tokio::test]
async fn search_pages_until_exhausted() {
    let server = MockServer::start().await;
    let nearby = format!("{PLACES_PATH}/nearbysearch/json");

    Mock::given(method("GET"))
        .and(path(nearby.as_str()))
        .and(query_param_is_missing("pagetoken"))
        .and(query_param("radius", "500"))
        .and(query_param("type", "restaurant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nearby_page(
            vec![
                place("p1", "Joe's Pizza", JOES),
                place("p2", "Katz's Delicatessen", KATZ),
            ],
            Some("page-2"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(nearby.as_str()))
        .and(query_param("pagetoken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nearby_page(
            vec![place("p3", "Veselka", (40.7290, -73.9871))],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server, ServiceRegistry::new());
    orchestrator.search_nearby(Coordinates::new(JOES.0, JOES.1), Some(500.0));
    orchestrator.settle().await;

    let ids: Vec<String> = orchestrator
        .registry()
        .listed()
        .iter()
        .map(|venue| venue.provider_id().to_string())
        .collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);

    let joes = orchestrator.entity(&ProviderId::new("p1")).unwrap();
    assert_eq!(
        joes.attribute_string(Service::Google, "vicinity").as_deref(),
        Some("1 Main St")
    );
    assert!(orchestrator.notifications().active().is_empty());
}

#[tokio::test]
async fn newer_search_supersedes_older() {
    let server = MockServer::start().await;
    let nearby = format!("{PLACES_PATH}/nearbysearch/json");

    Mock::given(method("GET"))
        .and(path(nearby.as_str()))
        .and(query_param("radius", "500"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(nearby_page(vec![place("old", "Old Place", JOES)], Some("more")))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(0..=1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(nearby.as_str()))
        .and(query_param("radius", "900"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(nearby_page(vec![place("new", "New Place", KATZ)], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server, ServiceRegistry::new());
    let first = orchestrator.search_nearby(Coordinates::new(JOES.0, JOES.1), Some(500.0));
    let second = orchestrator.search_nearby(Coordinates::new(JOES.0, JOES.1), Some(900.0));
    assert_ne!(first, second);
    orchestrator.settle().await;

    let ids: Vec<String> = orchestrator
        .registry()
        .all()
        .iter()
        .map(|venue| venue.provider_id().to_string())
        .collect();
    assert_eq!(ids, vec!["new"]);
    assert!(orchestrator.notifications().active().is_empty());
}

#[tokio::test]
async fn empty_area_notifies_until_venues_arrive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{PLACES_PATH}/nearbysearch/json")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "ZERO_RESULTS", "results": []})),
        )
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server, ServiceRegistry::new());
    orchestrator.search_nearby(Coordinates::new(JOES.0, JOES.1), None);
    orchestrator.settle().await;

    let notifications = orchestrator.notifications().active();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::ZeroResults);

    let ingested = orchestrator.ingest(vec![summary("p1", "Joe's Pizza", JOES)]);
    assert_eq!(ingested.created, 1);
    assert!(orchestrator.notifications().active().is_empty());
}

#[tokio::test]
async fn query_limit_raises_rate_limit_notice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{PLACES_PATH}/nearbysearch/json")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "OVER_QUERY_LIMIT", "results": []})),
        )
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server, ServiceRegistry::new());
    orchestrator.search_nearby(Coordinates::new(JOES.0, JOES.1), None);
    orchestrator.settle().await;
    orchestrator.search_nearby(Coordinates::new(JOES.0, JOES.1), None);
    orchestrator.settle().await;

    let notifications = orchestrator.notifications().active();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::RateLimited);
    assert_eq!(notifications[0].service, Some(Service::Google));
}

#[tokio::test]
async fn select_fetches_details_everywhere() {
    let server = MockServer::start().await;
    let details = format!("{PLACES_PATH}/details/json");

    for (id, name) in [("p1", "Joe's Pizza"), ("p2", "Katz's Delicatessen")] {
        Mock::given(method("GET"))
            .and(path(details.as_str()))
            .and(query_param("placeid", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(place_details(id, name)))
            .expect(1)
            .mount(&server)
            .await;
    }
    // Katz is matched from Joe's results, so only one search is needed
    mount_yelp_search(
        &server,
        yelp_search(vec![
            yelp_business("a", "Joes Pizza", JOES),
            yelp_business("k", "Katz's Delicatessen", KATZ),
        ]),
        Duration::ZERO,
        1,
    )
    .await;
    mount_yelp_business(&server, "/v3/businesses/a", yelp_business("a", "Joes Pizza", JOES), 1).await;
    mount_yelp_business(
        &server,
        "/v3/businesses/k",
        yelp_business("k", "Katz's Delicatessen", KATZ),
        1,
    )
    .await;

    let callbacks = recording();
    let orchestrator = builder(&server, fast_config(), yelp_only())
        .callbacks(callbacks.clone())
        .build()
        .unwrap();
    orchestrator.ingest(vec![
        summary("p1", "Joe's Pizza", JOES),
        summary("p2", "Katz's Delicatessen", KATZ),
    ]);

    let joes = orchestrator.select(&ProviderId::new("p1")).unwrap();
    orchestrator.settle().await;

    assert_eq!(joes.search_type(Service::Google), SearchType::Places);
    assert_eq!(
        joes.attribute_string(Service::Google, "address").as_deref(),
        Some("1 Main St, New York, NY")
    );
    assert_eq!(joes.search_type(Service::Yelp), SearchType::Business);

    let katz = orchestrator.select(&ProviderId::new("p2")).unwrap();
    orchestrator.settle().await;

    assert_eq!(katz.search_type(Service::Yelp), SearchType::Business);
    assert!(!joes.flags().is_selected);
    assert!(katz.flags().is_selected);
    let selected = orchestrator.registry().selected().unwrap();
    assert!(Arc::ptr_eq(&selected, &katz));
    assert_eq!(
        callbacks.events(),
        vec!["selected p1", "deselected p1", "selected p2"]
    );

    assert!(
        orchestrator
            .select(&ProviderId::new("missing"))
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn disposed_venue_abandons_its_call() {
    let server = MockServer::start().await;
    mount_yelp_search(
        &server,
        yelp_search(vec![yelp_business("a", "Joes Pizza", JOES)]),
        Duration::from_secs(2),
        0..=1,
    )
    .await;

    let callbacks = recording();
    let orchestrator = builder(&server, fast_config(), yelp_only())
        .callbacks(callbacks.clone())
        .build()
        .unwrap();
    orchestrator.ingest(vec![summary("p1", "Joe's Pizza", JOES)]);
    let joes = orchestrator.entity(&ProviderId::new("p1")).unwrap();

    assert_eq!(
        orchestrator.request_detailed(Service::Yelp, &joes),
        RequestOutcome::Deferred
    );
    assert!(joes.dispose());
    tokio::time::timeout(Duration::from_secs(1), orchestrator.settle())
        .await
        .unwrap();

    assert_eq!(joes.search_type(Service::Yelp), SearchType::None);
    assert!(!joes.is_loading(Service::Yelp));
    assert!(orchestrator.active_calls().is_empty());
    assert!(orchestrator.queued_intercepts().is_empty());
    assert!(orchestrator.notifications().active().is_empty());
    assert_eq!(callbacks.events(), vec!["released p1"]);
    assert_eq!(
        orchestrator.request_detailed(Service::Yelp, &joes),
        RequestOutcome::Skipped(SkipReason::Disposed)
    );
}

#[tokio::test]
async fn ingest_evicts_oldest_but_keeps_favorites() {
    let server = MockServer::start().await;
    let orchestrator = builder(
        &server,
        fast_config().with_eviction(2, 1),
        ServiceRegistry::new(),
    )
    .build()
    .unwrap();

    orchestrator.ingest(vec![
        summary("p1", "Joe's Pizza", JOES),
        summary("p2", "Katz's Delicatessen", KATZ),
    ]);
    orchestrator
        .set_favorite(&ProviderId::new("p1"), true)
        .await
        .unwrap();

    let ingested = orchestrator.ingest(vec![
        summary("p2", "Katz's Delicatessen", KATZ),
        summary("p3", "Veselka", (40.7290, -73.9871)),
    ]);
    assert_eq!(ingested.created, 1);
    assert_eq!(ingested.refreshed, 1);
    assert_eq!(ingested.evicted, 1);

    let ids: Vec<String> = orchestrator
        .registry()
        .all()
        .iter()
        .map(|venue| venue.provider_id().to_string())
        .collect();
    assert_eq!(ids, vec!["p1", "p3"]);
}

#[tokio::test]
async fn favorites_and_view_survive_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("session.json"));

    let first = builder(&server, fast_config(), ServiceRegistry::new())
        .snapshots(SnapshotWriter::new(store.clone(), Duration::ZERO))
        .build()
        .unwrap();
    first.ingest(vec![
        summary("p1", "Joe's Pizza", JOES),
        summary("p2", "Katz's Delicatessen", KATZ),
    ]);
    let joes = first.entity(&ProviderId::new("p1")).unwrap();
    joes.update_flags(|flags| flags.is_selected = true);
    joes.advance_search(Service::Yelp, SearchType::Basic);

    first
        .set_favorite(&ProviderId::new("p1"), true)
        .await
        .unwrap();
    first
        .update_view(Bounds::around(Coordinates::new(JOES.0, JOES.1), 1_000.0), Some(16))
        .await;
    first.shutdown().await.unwrap();

    let snapshot = store.load().await.unwrap().unwrap();
    assert_eq!(snapshot.favorites.len(), 1);
    assert_eq!(snapshot.map_view.map(|view| view.zoom), Some(16));

    let second = orchestrator(&server, ServiceRegistry::new());
    assert_eq!(second.restore(&snapshot), 1);
    assert_eq!(second.restore(&snapshot), 0);

    let restored = second.entity(&ProviderId::new("p1")).unwrap();
    assert!(restored.is_favorite());
    assert!(!restored.flags().is_selected);
    assert_eq!(restored.display_name(), "Joe's Pizza");
    assert_eq!(restored.search_type(Service::Yelp), SearchType::Basic);
    assert_eq!(
        restored.attribute_string(Service::Google, "vicinity").as_deref(),
        Some("1 Main St")
    );
    assert_eq!(second.map_view(), snapshot.map_view);
    assert!(second.entity(&ProviderId::new("p2")).is_err());
}

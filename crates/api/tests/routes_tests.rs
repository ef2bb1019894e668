// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests of the HTTP routes against a mock map provider and edge proxy

use std::{future::Future, net::SocketAddr, time::Duration};

use api::{Server, ServerConfig, ShutdownConfig};
use api_client::PROXY_TARGET_PARAM;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
    Mock, MockServer, Request, ResponseTemplate,
    matchers::{method, path},
};

const PLACES_PATH: &str = "/places";
const PROXY_PATH: &str = "/proxy";

struct TestServer {
    base: String,
    client: reqwest::Client,
    token: CancellationToken,
}

impl TestServer {
    async fn start(upstream: &MockServer, configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let mut config = ServerConfig::for_testing(
            &format!("{}{PLACES_PATH}", upstream.uri()),
            &format!("{}{PROXY_PATH}", upstream.uri()),
        )
        .unwrap();
        configure(&mut config);

        let server = Server::new(config, ShutdownConfig::default()).await.unwrap();
        let (addr, token): (SocketAddr, _) =
            tokio_test::assert_ok!(server.run_for_testing().await);

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            token,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base)
    }

    async fn get(&self, route: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(route)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, route: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(route))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Poll `route` until `done` holds for its body
    async fn wait_for(&self, route: &str, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let (_, body) = self.get(route).await;
            if done(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (_, body) = self.get(route).await;
        body
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn place(id: &str, name: &str, lat: f64, lng: f64) -> Value {
    json!({
        "place_id": id,
        "name": name,
        "geometry": {"location": {"lat": lat, "lng": lng}},
        "vicinity": "1 Main St"
    })
}

async fn mount_nearby(upstream: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("{PLACES_PATH}/nearbysearch/json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(upstream)
        .await;
}

fn forwarded_path_is(expected: &'static str) -> impl Fn(&Request) -> bool {
    move |req: &Request| {
        req.url
            .query_pairs()
            .find(|(key, _)| key == PROXY_TARGET_PARAM)
            .and_then(|(_, value)| Url::parse(&value).ok())
            .is_some_and(|url| url.path() == expected)
    }
}

fn search_body() -> Value {
    json!({"center": {"lat": 40.73, "lng": -73.99}, "radius_meters": 500.0})
}

async fn search_two_venues(server: &TestServer, upstream: &MockServer) {
    mount_nearby(
        upstream,
        json!({
            "status": "OK",
            "results": [
                place("p1", "Joe's Pizza", 40.7300, -73.9900),
                place("p2", "Katz's Delicatessen", 40.7222, -73.9874)
            ]
        }),
    )
    .await;

    let (status, body) = server.post("/v1/search", search_body()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["generation"].is_u64());

    let venues = server
        .wait_for("/v1/venues", |body| {
            body.as_array().is_some_and(|venues| venues.len() == 2)
        })
        .await;
    assert_eq!(venues.as_array().map(Vec::len), Some(2));
}

async fn post_empty(server: &TestServer, route: &str) -> (StatusCode, Value) {
    let response = server.client.post(server.url(route)).send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_disabled_services() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, |_| {}).await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["environment"], "testing");
    assert_eq!(body["services"]["yelp"], false);
    assert!(body["status"]["Degraded"].is_object());
}

#[tokio::test]
async fn search_lists_venues() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, |_| {}).await;
    within(search_two_venues(&server, &upstream)).await;

    let (status, venues) = server.get("/v1/venues?listed=true").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = venues
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|venue| venue["display_name"].as_str())
        .collect();
    assert_eq!(names, vec!["Joe's Pizza", "Katz's Delicatessen"]);

    let (status, venue) = server.get("/v1/venues/p1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(venue["flags"]["is_listed"], true);
    assert_eq!(venue["services"]["yelp"]["search_type"], "None");
}

#[tokio::test]
async fn invalid_search_is_rejected() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, |_| {}).await;

    let (status, body) = server
        .post(
            "/v1/search",
            json!({"center": {"lat": 40.73, "lng": -73.99}, "radius_meters": 90_000.0}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("radius_meters"));

    let (status, body) = server
        .post("/v1/search", json!({"center": {"lat": 40.73}}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("lng"));
}

#[tokio::test]
async fn unknown_venue_is_not_found() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, |_| {}).await;

    let (status, body) = server.get("/v1/venues/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, _) = post_empty(&server, "/v1/venues/missing/select").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn select_loads_details_from_enabled_services() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{PLACES_PATH}/details/json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "result": {"place_id": "p1", "name": "Joe's Pizza", "website": "https://joes.example"}
        })))
        .expect(1)
        .mount(&upstream)
        .await;
    let business = json!({
        "id": "joes",
        "name": "Joe's Pizza",
        "rating": 4.0,
        "coordinates": {"latitude": 40.7300, "longitude": -73.9900}
    });
    Mock::given(method("GET"))
        .and(path(PROXY_PATH))
        .and(forwarded_path_is("/v3/businesses/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"businesses": [business], "total": 1})),
        )
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path(PROXY_PATH))
        .and(forwarded_path_is("/v3/businesses/joes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(business.clone()))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestServer::start(&upstream, |config| {
        config.services.yelp.enabled = true;
    })
    .await;
    within(search_two_venues(&server, &upstream)).await;

    let (status, venue) = post_empty(&server, "/v1/venues/p1/select").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(venue["flags"]["is_selected"], true);

    let venue = within(server.wait_for("/v1/venues/p1", |venue| {
        venue["services"]["yelp"]["search_type"] == "Business"
            && venue["services"]["google"]["search_type"] == "Places"
    }))
    .await;
    assert_eq!(venue["services"]["yelp"]["search_type"], "Business");
    assert_eq!(venue["services"]["google"]["search_type"], "Places");

    let (status, body) = post_empty(&server, "/v1/venues/p1/services/yelp").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "skipped");
    assert_eq!(body["reason"], "already_resolved");

    let (_, calls) = server.get("/v1/calls").await;
    assert_eq!(calls["active"], json!([]));
    assert_eq!(calls["queued"], json!([]));
}

#[tokio::test]
async fn disabled_service_request_is_rejected() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, |_| {}).await;
    within(search_two_venues(&server, &upstream)).await;

    let (status, body) = post_empty(&server, "/v1/venues/p1/services/locu").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("locu"));
}

#[tokio::test]
async fn favorites_and_viewport() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, |_| {}).await;
    within(search_two_venues(&server, &upstream)).await;

    let (status, venue) = server
        .post("/v1/venues/p2/favorite", json!({"favorite": true}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(venue["flags"]["is_favorite"], true);

    let (_, favorites) = server.get("/v1/venues?favorites=true").await;
    assert_eq!(favorites.as_array().map(Vec::len), Some(1));
    assert_eq!(favorites[0]["provider_id"], "p2");

    let response = server
        .client
        .put(server.url("/v1/view"))
        .json(&json!({
            "bounds": {
                "south_west": {"lat": 40.7290, "lng": -73.9910},
                "north_east": {"lat": 40.7310, "lng": -73.9890}
            },
            "zoom": 17
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view: Value = response.json().await.unwrap();
    assert_eq!(view["in_view"], 1);
    assert_eq!(view["map_view"]["zoom"], 17);

    let (_, katz) = server.get("/v1/venues/p2").await;
    assert_eq!(katz["flags"]["is_in_view_on_map"], false);
}

#[tokio::test]
async fn zero_results_notification_can_be_dismissed() {
    let upstream = MockServer::start().await;
    mount_nearby(&upstream, json!({"status": "ZERO_RESULTS", "results": []})).await;
    let server = TestServer::start(&upstream, |_| {}).await;

    let (status, _) = server.post("/v1/search", search_body()).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let body = within(server.wait_for("/v1/notifications", |body| {
        body["notifications"]
            .as_array()
            .is_some_and(|list| !list.is_empty())
    }))
    .await;
    let notification = &body["notifications"][0];
    assert_eq!(notification["kind"], "zero_results");
    let id = notification["id"].as_u64().unwrap();

    let route = format!("/v1/notifications/{id}");
    let response = server
        .client
        .delete(server.url(&route))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server
        .client
        .delete(server.url(&route))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream, |_| {}).await;

    let (status, doc) = server.get("/api-doc/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "Venue Map API");
    assert!(doc["paths"]["/v1/venues/{id}/select"].is_object());
}

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use football_dash::config::Config;
use football_dash::remote::{ApiSportsClient, RemoteSource};

fn client_for(server: &MockServer) -> ApiSportsClient {
    let config = Config {
        api_key: Some("test-key".to_string()),
        base_url: server.base_url(),
        http_timeout: Duration::from_secs(1),
        http_retries: 1,
        ..Config::default()
    };
    ApiSportsClient::new(&config).expect("client should build")
}

#[test]
fn fetch_matches_sends_finished_filter_and_key() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/fixtures")
            .query_param("league", "39")
            .query_param("season", "2022")
            .query_param("status", "FT")
            .header("x-apisports-key", "test-key");
        then.status(200).json_body(json!({
            "errors": [],
            "response": [{"fixture": {"id": 1}}, {"fixture": {"id": 2}}]
        }));
    });

    let rows = client_for(&server).fetch_matches(39, "2022");
    mock.assert();
    assert_eq!(rows.len(), 2);
}

#[test]
fn non_success_status_degrades_to_empty() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fixtures");
        then.status(500).body("upstream exploded");
    });
    server.mock(|when, then| {
        when.method(GET).path("/leagues");
        then.status(403).body("forbidden");
    });
    server.mock(|when, then| {
        when.method(GET).path("/fixtures/lineups");
        then.status(429).body("rate limited");
    });

    let client = client_for(&server);
    assert!(client.fetch_matches(39, "2022").is_empty());
    assert!(client.list_leagues().is_empty());
    assert!(client.list_seasons().is_empty());
    assert!(client.fetch_lineups(7).is_none());
}

#[test]
fn api_error_payload_degrades_to_empty() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/leagues");
        then.status(200)
            .json_body(json!({"errors": {"token": "invalid key"}, "response": []}));
    });

    assert!(client_for(&server).list_leagues().is_empty());
}

#[test]
fn seasons_come_from_league_listing() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/leagues");
        then.status(200).json_body(json!({
            "errors": [],
            "response": [
                {"league": {"id": 39}, "seasons": [{"year": 2022}, {"year": 2023}]},
                {"league": {"id": 140}, "seasons": [{"year": 2021}, {"year": 2023}]}
            ]
        }));
    });

    assert_eq!(client_for(&server).list_seasons(), vec![2023, 2022, 2021]);
}

#[test]
fn lineups_hit_fixture_endpoint() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/fixtures/lineups")
            .query_param("fixture", "868");
        then.status(200).json_body(json!({
            "errors": [],
            "response": [{"team": {"name": "Arsenal"}, "startXI": [], "substitutes": []}]
        }));
    });

    let sides = client_for(&server).fetch_lineups(868).expect("lineups present");
    mock.assert();
    assert_eq!(sides.len(), 1);
}

#[test]
fn timeout_is_retried_then_absorbed() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/fixtures/lineups");
        then.status(200)
            .delay(Duration::from_millis(1500))
            .json_body(json!({"errors": [], "response": []}));
    });

    assert!(client_for(&server).fetch_lineups(1).is_none());
    mock.assert_hits(2);
}

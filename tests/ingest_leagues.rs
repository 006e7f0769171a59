mod common;

use common::FakeRemote;
use football_dash::ingest::{IngestEngine, IngestOutcome};
use football_dash::store::Store;
use serde_json::json;

fn premier_league() -> serde_json::Value {
    json!({
        "league": {"id": 39, "name": "Premier League", "type": "League", "logo": "https://media/39.png"},
        "country": {"name": "England"},
        "seasons": [
            {"year": 2022, "start": "2022-08-05", "end": "2023-05-28", "current": false},
            {"year": 2023, "start": "2023-08-11", "end": "2024-05-19", "current": true}
        ]
    })
}

#[test]
fn only_current_season_is_stored() {
    let store = Store::open_in_memory().unwrap();
    let remote = FakeRemote::default();
    let engine = IngestEngine::new(&store, &remote, 1);

    let report = engine.ingest_leagues(&[premier_league()]);
    assert_eq!(report.counts().inserted, 1);

    let rows = store.read_all_leagues().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].season, "2023");
    assert_eq!(rows[0].name, "Premier League");
    assert!(store.find_league(39, "2022").unwrap().is_none());
}

#[test]
fn existing_league_season_is_left_alone() {
    let store = Store::open_in_memory().unwrap();
    let remote = FakeRemote {
        leagues: vec![premier_league()],
        ..FakeRemote::default()
    };
    let engine = IngestEngine::new(&store, &remote, 1);

    engine.sync_current_leagues();
    let mut renamed = premier_league();
    renamed["league"]["name"] = json!("EPL");
    let report = engine.ingest_leagues(&[renamed]);

    assert_eq!(report.records[0].outcome, IngestOutcome::Unchanged);
    assert_eq!(store.find_league(39, "2023").unwrap().unwrap().name, "Premier League");
    assert_eq!(store.write_stats().inserts, 1);
}

#[test]
fn malformed_league_is_skipped() {
    let store = Store::open_in_memory().unwrap();
    let remote = FakeRemote::default();
    let engine = IngestEngine::new(&store, &remote, 1);

    let report = engine.ingest_leagues(&[json!({"league": {"name": "No id"}}), premier_league()]);
    let counts = report.counts();
    assert_eq!((counts.skipped, counts.inserted), (1, 1));
}

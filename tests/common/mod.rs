#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};

use football_dash::remote::RemoteSource;

/// Scripted remote source. Lineups default to "lookup failed".
#[derive(Default)]
pub struct FakeRemote {
    pub leagues: Vec<Value>,
    pub matches: HashMap<(i64, String), Vec<Value>>,
    pub lineups: HashMap<i64, Vec<Value>>,
    pub lineup_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn with_lineups(mut self, match_id: i64, sides: Vec<Value>) -> Self {
        self.lineups.insert(match_id, sides);
        self
    }

    pub fn with_matches(mut self, league_id: i64, season: &str, rows: Vec<Value>) -> Self {
        self.matches.insert((league_id, season.to_string()), rows);
        self
    }

    pub fn lineup_calls(&self) -> usize {
        self.lineup_calls.load(Ordering::SeqCst)
    }
}

impl RemoteSource for FakeRemote {
    fn list_leagues(&self) -> Vec<Value> {
        self.leagues.clone()
    }

    fn list_seasons(&self) -> Vec<u16> {
        football_dash::remote::seasons_from_leagues(&self.leagues)
    }

    fn fetch_matches(&self, league_id: i64, season: &str) -> Vec<Value> {
        self.matches
            .get(&(league_id, season.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn fetch_lineups(&self, match_id: i64) -> Option<Vec<Value>> {
        self.lineup_calls.fetch_add(1, Ordering::SeqCst);
        self.lineups.get(&match_id).cloned()
    }
}

pub fn fixture(id: i64, home: &str, away: &str, goals: (Option<i32>, Option<i32>), status: &str) -> Value {
    json!({
        "fixture": {
            "id": id,
            "date": "2023-05-01T18:00:00+00:00",
            "status": {"short": status}
        },
        "league": {"id": 39, "name": "Premier League", "season": 2022},
        "teams": {
            "home": {"name": home, "logo": format!("https://media/{home}.png")},
            "away": {"name": away, "logo": format!("https://media/{away}.png")}
        },
        "score": {"fulltime": {"home": goals.0, "away": goals.1}}
    })
}

pub fn lineup_side(team: &str, starters: &[&str], subs: &[&str]) -> Value {
    json!({
        "team": {"name": team},
        "formation": "4-3-3",
        "startXI": starters.iter().map(|n| json!({"player": {"name": n}})).collect::<Vec<_>>(),
        "substitutes": subs.iter().map(|n| json!({"player": {"name": n}})).collect::<Vec<_>>()
    })
}

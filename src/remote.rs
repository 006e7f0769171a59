use std::collections::BTreeSet;

use anyhow::Result;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RemoteError;
use crate::http_client::build_http_client;

const API_KEY_HEADER: &str = "x-apisports-key";
const SNIPPET_CHARS: usize = 500;

pub trait RemoteSource: Sync {
    fn list_leagues(&self) -> Vec<Value>;

    fn list_seasons(&self) -> Vec<u16>;

    fn fetch_matches(&self, league_id: i64, season: &str) -> Vec<Value>;

    /// Per-team lineup objects, `None` when the lookup failed.
    fn fetch_lineups(&self, match_id: i64) -> Option<Vec<Value>>;
}

pub struct ApiSportsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retries: u32,
}

impl ApiSportsClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.http_timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retries: config.http_retries,
        })
    }

    fn get_response(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>, RemoteError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(path, query) {
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    debug!(path, attempt, "retrying after timeout");
                }
                other => return other,
            }
        }
    }

    fn send_once(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url).query(query);
        if let Some(key) = self.api_key.as_deref() {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req.send()?;
        let status = resp.status();
        let body = resp.text()?;
        debug!(%url, status = status.as_u16(), "remote response");
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                snippet: snippet(&body),
            });
        }
        parse_envelope(&body)
    }
}

impl RemoteSource for ApiSportsClient {
    fn list_leagues(&self) -> Vec<Value> {
        self.get_response("/leagues", &[]).unwrap_or_else(|err| {
            warn!(error = %err, "league listing unavailable");
            Vec::new()
        })
    }

    fn list_seasons(&self) -> Vec<u16> {
        seasons_from_leagues(&self.list_leagues())
    }

    fn fetch_matches(&self, league_id: i64, season: &str) -> Vec<Value> {
        let query = [
            ("league", league_id.to_string()),
            ("season", season.to_string()),
            ("status", "FT".to_string()),
        ];
        self.get_response("/fixtures", &query)
            .unwrap_or_else(|err| {
                warn!(league_id, season, error = %err, "fixture listing unavailable");
                Vec::new()
            })
    }

    fn fetch_lineups(&self, match_id: i64) -> Option<Vec<Value>> {
        let query = [("fixture", match_id.to_string())];
        match self.get_response("/fixtures/lineups", &query) {
            Ok(sides) => Some(sides),
            Err(err) => {
                warn!(match_id, error = %err, "lineups unavailable");
                None
            }
        }
    }
}

pub fn parse_envelope(body: &str) -> Result<Vec<Value>, RemoteError> {
    let root: Value =
        serde_json::from_str(body.trim()).map_err(|e| RemoteError::Decode(e.to_string()))?;

    let has_errors = match root.get("errors") {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        _ => false,
    };
    if has_errors {
        let errors = root.get("errors").map(Value::to_string).unwrap_or_default();
        return Err(RemoteError::Unavailable(snippet(&errors)));
    }

    match root.get("response") {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::Null) | None => Err(RemoteError::Decode("missing response array".into())),
        Some(_) => Err(RemoteError::Decode("response is not an array".into())),
    }
}

pub fn seasons_from_leagues(leagues: &[Value]) -> Vec<u16> {
    let mut years = BTreeSet::new();
    for league in leagues {
        let Some(seasons) = league.get("seasons").and_then(|v| v.as_array()) else {
            continue;
        };
        for season in seasons {
            if let Some(year) = season
                .get("year")
                .and_then(|y| y.as_u64())
                .and_then(|y| u16::try_from(y).ok())
            {
                years.insert(year);
            }
        }
    }
    years.into_iter().rev().collect()
}

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_CHARS).collect()
}

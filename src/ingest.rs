use anyhow::{Result, anyhow};
use chrono::Utc;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{MalformedRecord, StoreError};
use crate::model::{League, Match, MatchResult, MatchUpdate};
use crate::remote::RemoteSource;
use crate::store::{IngestRun, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated { fields: Vec<&'static str> },
    Unchanged,
    Skipped { reason: String },
    Failed { cause: String, integrity: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub index: usize,
    pub key: Option<String>,
    pub outcome: IngestOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub records: Vec<RecordOutcome>,
}

impl IngestReport {
    pub fn counts(&self) -> IngestCounts {
        let mut counts = IngestCounts::default();
        for rec in &self.records {
            match rec.outcome {
                IngestOutcome::Inserted => counts.inserted += 1,
                IngestOutcome::Updated { .. } => counts.updated += 1,
                IngestOutcome::Unchanged => counts.unchanged += 1,
                IngestOutcome::Skipped { .. } => counts.skipped += 1,
                IngestOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn writes(&self) -> usize {
        let counts = self.counts();
        counts.inserted + counts.updated
    }

    pub fn integrity_failures(&self) -> Vec<&RecordOutcome> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, IngestOutcome::Failed { integrity: true, .. }))
            .collect()
    }

    /// Errors out when any record hit a duplicate-key or missing-row failure.
    pub fn ensure_integrity(&self) -> Result<()> {
        let failures = self.integrity_failures();
        if failures.is_empty() {
            return Ok(());
        }
        let keys = failures
            .iter()
            .map(|r| r.key.clone().unwrap_or_else(|| format!("#{}", r.index)))
            .collect::<Vec<_>>();
        Err(anyhow!("store integrity violated for {}", keys.join(", ")))
    }

    pub fn errors(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| {
                let label = r
                    .key
                    .clone()
                    .unwrap_or_else(|| format!("record {}", r.index));
                match &r.outcome {
                    IngestOutcome::Skipped { reason } => Some(format!("{label}: {reason}")),
                    IngestOutcome::Failed { cause, .. } => Some(format!("{label}: {cause}")),
                    _ => None,
                }
            })
            .collect()
    }
}

pub struct IngestEngine<'a, R: RemoteSource + ?Sized> {
    store: &'a Store,
    remote: &'a R,
    pool: Option<rayon::ThreadPool>,
}

impl<'a, R: RemoteSource + ?Sized> IngestEngine<'a, R> {
    pub fn new(store: &'a Store, remote: &'a R, parallelism: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .build()
            .ok();
        Self {
            store,
            remote,
            pool,
        }
    }

    pub fn ingest_matches(&self, raw: &[Value]) -> IngestReport {
        let parsed: Vec<Result<Match, MalformedRecord>> =
            raw.iter().map(parse_match_record).collect();

        // Lineup fetches are the only slow part; store decisions below stay
        // sequential and in input order.
        let lineups: Vec<Option<String>> = self.with_pool(|| {
            parsed
                .par_iter()
                .map(|rec| match rec {
                    Ok(m) => self.lineup_blob(m.id),
                    Err(_) => None,
                })
                .collect()
        });

        let mut report = IngestReport::default();
        for (index, (rec, blob)) in parsed.into_iter().zip(lineups).enumerate() {
            let outcome = match rec {
                Err(err) => {
                    warn!(index, error = %err, "skipping match record");
                    RecordOutcome {
                        index,
                        key: raw_match_id(&raw[index]).map(|id| id.to_string()),
                        outcome: IngestOutcome::Skipped {
                            reason: err.to_string(),
                        },
                    }
                }
                Ok(mut m) => {
                    m.lineups = blob;
                    RecordOutcome {
                        index,
                        key: Some(m.id.to_string()),
                        outcome: self.apply_match(&m),
                    }
                }
            };
            report.records.push(outcome);
        }
        report
    }

    pub fn ingest_leagues(&self, raw: &[Value]) -> IngestReport {
        let mut report = IngestReport::default();
        for (index, record) in raw.iter().enumerate() {
            let leagues = match parse_league_record(record) {
                Ok(leagues) => leagues,
                Err(err) => {
                    warn!(index, error = %err, "skipping league record");
                    report.records.push(RecordOutcome {
                        index,
                        key: None,
                        outcome: IngestOutcome::Skipped {
                            reason: err.to_string(),
                        },
                    });
                    continue;
                }
            };
            for league in leagues {
                report.records.push(RecordOutcome {
                    index,
                    key: Some(format!("{}/{}", league.id, league.season)),
                    outcome: self.apply_league(&league),
                });
            }
        }
        report
    }

    pub fn ingest_league_season(&self, league_id: i64, season: &str) -> IngestReport {
        let started_at = Utc::now().to_rfc3339();
        let raw = self.remote.fetch_matches(league_id, season);
        if raw.is_empty() {
            info!(league_id, season, "no finished matches returned");
        }
        let report = self.ingest_matches(&raw);
        self.record_run(started_at, Some(league_id), Some(season), &report);
        report
    }

    pub fn sync_current_leagues(&self) -> IngestReport {
        let started_at = Utc::now().to_rfc3339();
        let raw = self.remote.list_leagues();
        let report = self.ingest_leagues(&raw);
        self.record_run(started_at, None, None, &report);
        report
    }

    fn apply_match(&self, m: &Match) -> IngestOutcome {
        let res = self.store.transaction(|tx| match tx.find_match_by_id(m.id)? {
            None => {
                tx.insert_match(m)?;
                Ok(IngestOutcome::Inserted)
            }
            Some(existing) => {
                let update =
                    MatchUpdate::between(&MatchResult::from(&existing), &MatchResult::from(m));
                if update.is_empty() {
                    return Ok(IngestOutcome::Unchanged);
                }
                tx.update_match_fields(m.id, &update)?;
                info!(match_id = m.id, fields = ?update.fields(), "updated match");
                Ok(IngestOutcome::Updated {
                    fields: update.fields(),
                })
            }
        });
        res.unwrap_or_else(|err| failed(&format!("match {}", m.id), err))
    }

    fn apply_league(&self, league: &League) -> IngestOutcome {
        let res = self
            .store
            .transaction(|tx| match tx.find_league(league.id, &league.season)? {
                Some(_) => Ok(IngestOutcome::Unchanged),
                None => {
                    tx.insert_league(league)?;
                    Ok(IngestOutcome::Inserted)
                }
            });
        res.unwrap_or_else(|err| failed(&format!("league {}/{}", league.id, league.season), err))
    }

    fn lineup_blob(&self, match_id: i64) -> Option<String> {
        let sides = self.remote.fetch_lineups(match_id)?;
        if sides.is_empty() {
            return None;
        }
        match serde_json::to_string(&sides) {
            Ok(blob) => Some(blob),
            Err(err) => {
                warn!(match_id, error = %err, "could not serialize lineups");
                None
            }
        }
    }

    fn record_run(
        &self,
        started_at: String,
        league_id: Option<i64>,
        season: Option<&str>,
        report: &IngestReport,
    ) {
        let counts = report.counts();
        let run = IngestRun {
            run_id: 0,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            league_id,
            season: season.map(str::to_string),
            inserted: counts.inserted,
            updated: counts.updated,
            unchanged: counts.unchanged,
            skipped: counts.skipped,
            failed: counts.failed,
            errors: report.errors(),
        };
        if let Err(err) = self.store.record_ingest_run(&run) {
            warn!(error = %err, "could not record ingest run");
        }
    }

    fn with_pool<T: Send>(&self, action: impl FnOnce() -> T + Send) -> T {
        if let Some(pool) = self.pool.as_ref() {
            pool.install(action)
        } else {
            action()
        }
    }
}

fn failed(label: &str, err: StoreError) -> IngestOutcome {
    let integrity = err.is_integrity_violation();
    if integrity {
        error!(record = label, error = %err, "store integrity violation");
    } else {
        error!(record = label, error = %err, "store write failed");
    }
    IngestOutcome::Failed {
        cause: err.to_string(),
        integrity,
    }
}

pub fn parse_match_record(v: &Value) -> Result<Match, MalformedRecord> {
    let fixture = v.get("fixture").ok_or(missing("fixture"))?;
    let id = fixture
        .get("id")
        .and_then(as_i64_any)
        .ok_or(missing("fixture.id"))?;
    let date = str_at(fixture, &["date"]).ok_or(missing("fixture.date"))?;
    let status = str_at(fixture, &["status", "short"]).ok_or(missing("fixture.status.short"))?;

    let teams = v.get("teams").ok_or(missing("teams"))?;
    let home_team = str_at(teams, &["home", "name"]).ok_or(missing("teams.home.name"))?;
    let away_team = str_at(teams, &["away", "name"]).ok_or(missing("teams.away.name"))?;
    let home_team_logo = str_at(teams, &["home", "logo"]).filter(|s| !s.is_empty());
    let away_team_logo = str_at(teams, &["away", "logo"]).filter(|s| !s.is_empty());

    let fulltime = v.get("score").and_then(|s| s.get("fulltime"));
    let home_score = fulltime.and_then(|f| f.get("home")).and_then(as_i32_any);
    let away_score = fulltime.and_then(|f| f.get("away")).and_then(as_i32_any);

    let league = v.get("league").ok_or(missing("league"))?;
    let season = league
        .get("season")
        .and_then(as_season)
        .ok_or(missing("league.season"))?;
    let competition = str_at(league, &["name"]).ok_or(missing("league.name"))?;

    Ok(Match {
        id,
        date,
        home_team,
        away_team,
        home_team_logo,
        away_team_logo,
        home_score,
        away_score,
        status,
        season,
        competition,
        lineups: None,
    })
}

pub fn parse_league_record(v: &Value) -> Result<Vec<League>, MalformedRecord> {
    let league = v.get("league").ok_or(missing("league"))?;
    let id = league
        .get("id")
        .and_then(as_i64_any)
        .ok_or(missing("league.id"))?;
    let name = str_at(league, &["name"]).ok_or(missing("league.name"))?;
    let logo = str_at(league, &["logo"]).filter(|s| !s.is_empty());
    let kind = str_at(league, &["type"]).unwrap_or_else(|| "League".to_string());
    let country = v
        .get("country")
        .and_then(|c| str_at(c, &["name"]))
        .unwrap_or_else(|| "Unknown".to_string());

    let seasons = v
        .get("seasons")
        .and_then(|s| s.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut out = Vec::new();
    for season in seasons {
        let current = season
            .get("current")
            .and_then(|c| c.as_bool())
            .unwrap_or(false);
        if !current {
            continue;
        }
        let Some(year) = season.get("year").and_then(as_season) else {
            continue;
        };
        out.push(League {
            id,
            season: year,
            name: name.clone(),
            country: country.clone(),
            logo: logo.clone(),
            start_date: str_at(season, &["start"]),
            end_date: str_at(season, &["end"]),
            kind: kind.clone(),
        });
    }
    Ok(out)
}

fn raw_match_id(v: &Value) -> Option<i64> {
    v.get("fixture")?.get("id").and_then(as_i64_any)
}

fn missing(path: &'static str) -> MalformedRecord {
    MalformedRecord { missing: path }
}

fn str_at(v: &Value, path: &[&str]) -> Option<String> {
    let mut cur = v;
    for key in path {
        cur = cur.get(*key)?;
    }
    cur.as_str().map(|s| s.to_string())
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn as_i32_any(v: &Value) -> Option<i32> {
    let n = as_i64_any(v)?;
    i32::try_from(n).ok()
}

fn as_season(v: &Value) -> Option<String> {
    if let Some(n) = v.as_i64() {
        return Some(n.to_string());
    }
    let s = v.as_str()?.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fixture() -> Value {
        json!({
            "fixture": {"id": 101, "date": "2023-05-01T18:00:00+00:00", "status": {"short": "FT"}},
            "league": {"id": 39, "name": "Premier League", "season": 2022},
            "teams": {
                "home": {"name": "Arsenal", "logo": "https://media/1.png"},
                "away": {"name": "Chelsea", "logo": ""}
            },
            "score": {"fulltime": {"home": 3, "away": 1}}
        })
    }

    #[test]
    fn maps_full_fixture() {
        let m = parse_match_record(&fixture()).unwrap();
        assert_eq!(m.id, 101);
        assert_eq!(m.season, "2022");
        assert_eq!(m.competition, "Premier League");
        assert_eq!(m.home_team_logo.as_deref(), Some("https://media/1.png"));
        assert_eq!(m.away_team_logo, None);
        assert_eq!((m.home_score, m.away_score), (Some(3), Some(1)));
        assert!(m.lineups.is_none());
    }

    #[test]
    fn null_fulltime_means_no_score() {
        let mut raw = fixture();
        raw["score"]["fulltime"] = Value::Null;
        raw["fixture"]["status"]["short"] = json!("PST");
        let m = parse_match_record(&raw).unwrap();
        assert_eq!((m.home_score, m.away_score), (None, None));
        assert_eq!(m.status, "PST");
    }

    #[test]
    fn missing_identity_is_malformed() {
        let mut raw = fixture();
        raw["fixture"].as_object_mut().unwrap().remove("id");
        assert_eq!(
            parse_match_record(&raw),
            Err(MalformedRecord { missing: "fixture.id" })
        );
        assert_eq!(
            parse_match_record(&json!({"fixture": {"id": 1}})),
            Err(MalformedRecord { missing: "fixture.date" })
        );
    }

    #[test]
    fn league_keeps_only_current_seasons() {
        let raw = json!({
            "league": {"id": 39, "name": "Premier League", "type": "League", "logo": "l.png"},
            "country": {"name": "England"},
            "seasons": [
                {"year": 2022, "start": "2022-08-05", "end": "2023-05-28", "current": false},
                {"year": 2023, "start": "2023-08-11", "end": "2024-05-19", "current": true}
            ]
        });
        let rows = parse_league_record(&raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].season, "2023");
        assert_eq!(rows[0].country, "England");
        assert_eq!(rows[0].start_date.as_deref(), Some("2023-08-11"));
    }

    #[test]
    fn league_defaults_fill_optional_fields() {
        let raw = json!({
            "league": {"id": 2, "name": "Cup"},
            "seasons": [{"year": 2023, "current": true}]
        });
        let rows = parse_league_record(&raw).unwrap();
        assert_eq!(rows[0].country, "Unknown");
        assert_eq!(rows[0].kind, "League");
        assert!(rows[0].logo.is_none());
    }

    #[test]
    fn report_surfaces_integrity_failures() {
        let report = IngestReport {
            records: vec![
                RecordOutcome {
                    index: 0,
                    key: Some("1".to_string()),
                    outcome: IngestOutcome::Inserted,
                },
                RecordOutcome {
                    index: 1,
                    key: Some("2".to_string()),
                    outcome: IngestOutcome::Failed {
                        cause: "duplicate key in matches: 2".to_string(),
                        integrity: true,
                    },
                },
            ],
        };
        assert_eq!(report.integrity_failures().len(), 1);
        assert!(report.ensure_integrity().is_err());
        assert_eq!(report.errors(), vec!["2: duplicate key in matches: 2".to_string()]);
    }

    #[test]
    fn store_key_failures_map_to_integrity_outcomes() {
        let store = Store::open_in_memory().unwrap();
        let m = parse_match_record(&fixture()).unwrap();

        let dup = store
            .transaction(|tx| {
                tx.insert_match(&m)?;
                tx.insert_match(&m)
            })
            .unwrap_err();
        let dup = failed("match 101", dup);
        assert!(matches!(dup, IngestOutcome::Failed { integrity: true, .. }));

        let update = MatchUpdate {
            status: Some("AET".to_string()),
            ..MatchUpdate::default()
        };
        let missing_row = store.update_match_fields(999, &update).unwrap_err();
        let missing_row = failed("match 999", missing_row);
        assert!(matches!(missing_row, IngestOutcome::Failed { integrity: true, .. }));

        let report = IngestReport {
            records: vec![
                RecordOutcome {
                    index: 0,
                    key: Some("101".to_string()),
                    outcome: dup,
                },
                RecordOutcome {
                    index: 1,
                    key: Some("999".to_string()),
                    outcome: missing_row,
                },
            ],
        };
        assert_eq!(report.counts().failed, 2);
        let err = report.ensure_integrity().unwrap_err().to_string();
        assert!(err.contains("101") && err.contains("999"));
        assert!(store.find_match_by_id(101).unwrap().is_none());
    }
}

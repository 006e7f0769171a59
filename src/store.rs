use std::cell::Cell;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ffi, params, params_from_iter};

use crate::error::StoreError;
use crate::model::{League, Match, MatchUpdate};
use crate::query::MatchFilter;

const MATCH_COLUMNS: &str = "id, date, home_team, away_team, home_team_logo, away_team_logo, \
     home_score, away_score, status, season, competition, lineups";

const LEAGUE_COLUMNS: &str = "id, season, name, country, logo, start_date, end_date, type";

pub struct Store {
    conn: Mutex<Connection>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub inserts: usize,
    pub updates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRun {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: String,
    pub league_id: Option<i64>,
    pub season: Option<String>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("enable sqlite wal")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        };
        store
            .create_schema_if_absent()
            .context("create sqlite schema")?;
        Ok(store)
    }

    pub fn create_schema_if_absent(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                home_team TEXT NOT NULL,
                away_team TEXT NOT NULL,
                home_team_logo TEXT NULL,
                away_team_logo TEXT NULL,
                home_score INTEGER NULL,
                away_score INTEGER NULL,
                status TEXT NOT NULL,
                season TEXT NOT NULL,
                competition TEXT NOT NULL,
                lineups TEXT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season);
            CREATE INDEX IF NOT EXISTS idx_matches_competition ON matches(competition);

            CREATE TABLE IF NOT EXISTS leagues (
                id INTEGER NOT NULL,
                season TEXT NOT NULL,
                name TEXT NOT NULL,
                country TEXT NOT NULL,
                logo TEXT NULL,
                start_date TEXT NULL,
                end_date TEXT NULL,
                type TEXT NOT NULL,
                PRIMARY KEY (id, season)
            );

            CREATE TABLE IF NOT EXISTS ingest_runs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                league_id INTEGER NULL,
                season TEXT NULL,
                inserted INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                unchanged INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                errors_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Runs `f` inside one SQLite transaction. Commits on `Ok`, rolls back on
    /// `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&StoreTx<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let scope = StoreTx {
            conn: &tx,
            inserts: Cell::new(0),
            updates: Cell::new(0),
        };
        let out = f(&scope)?;
        let (inserts, updates) = (scope.inserts.get(), scope.updates.get());
        tx.commit()?;
        self.inserts.fetch_add(inserts, Ordering::Relaxed);
        self.updates.fetch_add(updates, Ordering::Relaxed);
        Ok(out)
    }

    pub fn find_match_by_id(&self, id: i64) -> Result<Option<Match>, StoreError> {
        self.transaction(|tx| tx.find_match_by_id(id))
    }

    pub fn insert_match(&self, m: &Match) -> Result<(), StoreError> {
        self.transaction(|tx| tx.insert_match(m))
    }

    pub fn update_match_fields(&self, id: i64, update: &MatchUpdate) -> Result<(), StoreError> {
        self.transaction(|tx| tx.update_match_fields(id, update))
    }

    pub fn find_league(&self, id: i64, season: &str) -> Result<Option<League>, StoreError> {
        self.transaction(|tx| tx.find_league(id, season))
    }

    pub fn insert_league(&self, league: &League) -> Result<(), StoreError> {
        self.transaction(|tx| tx.insert_league(league))
    }

    pub fn read_all_matches(&self) -> Result<Vec<Match>, StoreError> {
        self.read_matches(&MatchFilter::default())
    }

    pub fn read_matches(&self, filter: &MatchFilter) -> Result<Vec<Match>, StoreError> {
        let (where_clause, values) = filter.where_clause();
        let sql =
            format!("SELECT {MATCH_COLUMNS} FROM matches {where_clause} ORDER BY date ASC, id ASC");
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), match_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn read_all_leagues(&self) -> Result<Vec<League>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEAGUE_COLUMNS} FROM leagues ORDER BY name ASC, season DESC"
        ))?;
        let rows = stmt.query_map([], league_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn record_ingest_run(&self, run: &IngestRun) -> Result<i64, StoreError> {
        let errors_json = serde_json::to_string(&run.errors)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO ingest_runs(started_at, finished_at, league_id, season, inserted, updated, unchanged, skipped, failed, errors_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.started_at,
                run.finished_at,
                run.league_id,
                run.season,
                run.inserted as i64,
                run.updated as i64,
                run.unchanged as i64,
                run.skipped as i64,
                run.failed as i64,
                errors_json,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn recent_ingest_runs(&self, limit: usize) -> Result<Vec<IngestRun>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, started_at, finished_at, league_id, season, inserted, updated, unchanged, skipped, failed, errors_json
             FROM ingest_runs ORDER BY run_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let errors_json: String = row.get(10)?;
            let run = IngestRun {
                run_id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                league_id: row.get(3)?,
                season: row.get(4)?,
                inserted: row.get::<_, i64>(5)? as usize,
                updated: row.get::<_, i64>(6)? as usize,
                unchanged: row.get::<_, i64>(7)? as usize,
                skipped: row.get::<_, i64>(8)? as usize,
                failed: row.get::<_, i64>(9)? as usize,
                errors: Vec::new(),
            };
            Ok((run, errors_json))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (mut run, errors_json) = row?;
            run.errors = serde_json::from_str(&errors_json)?;
            out.push(run);
        }
        Ok(out)
    }

    pub fn write_stats(&self) -> WriteStats {
        WriteStats {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

pub struct StoreTx<'a> {
    conn: &'a Connection,
    inserts: Cell<usize>,
    updates: Cell<usize>,
}

impl StoreTx<'_> {
    pub fn find_match_by_id(&self, id: i64) -> Result<Option<Match>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
                params![id],
                match_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_match(&self, m: &Match) -> Result<(), StoreError> {
        let res = self.conn.execute(
            &format!(
                "INSERT INTO matches ({MATCH_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                m.id,
                m.date,
                m.home_team,
                m.away_team,
                m.home_team_logo,
                m.away_team_logo,
                m.home_score,
                m.away_score,
                m.status,
                m.season,
                m.competition,
                m.lineups,
            ],
        );
        match res {
            Ok(_) => {
                self.inserts.set(self.inserts.get() + 1);
                Ok(())
            }
            Err(err) if is_duplicate_key(&err) => Err(StoreError::DuplicateKey {
                table: "matches",
                key: m.id.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub fn update_match_fields(&self, id: i64, update: &MatchUpdate) -> Result<(), StoreError> {
        let mut assignments: Vec<String> = Vec::with_capacity(3);
        let mut values: Vec<SqlValue> = Vec::with_capacity(4);

        if let Some(home_score) = update.home_score {
            values.push(opt_int(home_score));
            assignments.push(format!("home_score = ?{}", values.len()));
        }
        if let Some(away_score) = update.away_score {
            values.push(opt_int(away_score));
            assignments.push(format!("away_score = ?{}", values.len()));
        }
        if let Some(status) = update.status.as_ref() {
            values.push(SqlValue::Text(status.clone()));
            assignments.push(format!("status = ?{}", values.len()));
        }

        if assignments.is_empty() {
            return match self.find_match_by_id(id)? {
                Some(_) => Ok(()),
                None => Err(not_found_match(id)),
            };
        }

        values.push(SqlValue::Integer(id));
        let sql = format!(
            "UPDATE matches SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );
        let changed = self.conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(not_found_match(id));
        }
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }

    pub fn find_league(&self, id: i64, season: &str) -> Result<Option<League>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {LEAGUE_COLUMNS} FROM leagues WHERE id = ?1 AND season = ?2"),
                params![id, season],
                league_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_league(&self, league: &League) -> Result<(), StoreError> {
        let res = self.conn.execute(
            &format!("INSERT INTO leagues ({LEAGUE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                league.id,
                league.season,
                league.name,
                league.country,
                league.logo,
                league.start_date,
                league.end_date,
                league.kind,
            ],
        );
        match res {
            Ok(_) => {
                self.inserts.set(self.inserts.get() + 1);
                Ok(())
            }
            Err(err) if is_duplicate_key(&err) => Err(StoreError::DuplicateKey {
                table: "leagues",
                key: format!("{}/{}", league.id, league.season),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        date: row.get(1)?,
        home_team: row.get(2)?,
        away_team: row.get(3)?,
        home_team_logo: row.get(4)?,
        away_team_logo: row.get(5)?,
        home_score: row.get(6)?,
        away_score: row.get(7)?,
        status: row.get(8)?,
        season: row.get(9)?,
        competition: row.get(10)?,
        lineups: row.get(11)?,
    })
}

fn league_from_row(row: &Row<'_>) -> rusqlite::Result<League> {
    Ok(League {
        id: row.get(0)?,
        season: row.get(1)?,
        name: row.get(2)?,
        country: row.get(3)?,
        logo: row.get(4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        kind: row.get(7)?,
    })
}

fn opt_int(v: Option<i32>) -> SqlValue {
    v.map(|n| SqlValue::Integer(i64::from(n)))
        .unwrap_or(SqlValue::Null)
}

fn not_found_match(id: i64) -> StoreError {
    StoreError::NotFound {
        table: "matches",
        key: id.to_string(),
    }
}

// Only key collisions count; NOT NULL and CHECK failures stay `Sqlite`.
fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "football_dash";
const DB_FILE: &str = "football.sqlite";
const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 1;
const DEFAULT_PARALLELISM: usize = 4;
const DEFAULT_MAX_SEASON: u16 = 2023;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub db_path: Option<PathBuf>,
    pub http_timeout: Duration,
    pub http_retries: u32,
    pub ingest_parallelism: usize,
    pub max_season: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_vars()
    }

    pub fn from_vars() -> Self {
        let api_key = env::var("FOOTBALL_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let base_url = env::var("FOOTBALL_API_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let db_path = env::var("DB_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(default_db_path);
        let timeout_secs = env_parse("HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS).clamp(1, 120);
        let http_retries = env_parse("HTTP_RETRIES", DEFAULT_RETRIES).min(5);
        let ingest_parallelism =
            env_parse("INGEST_PARALLELISM", DEFAULT_PARALLELISM).clamp(1, 16);
        let max_season = env_parse("MAX_SEASON", DEFAULT_MAX_SEASON);

        Self {
            api_key,
            base_url,
            db_path,
            http_timeout: Duration::from_secs(timeout_secs),
            http_retries,
            ingest_parallelism,
            max_season,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: None,
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            http_retries: DEFAULT_RETRIES,
            ingest_parallelism: DEFAULT_PARALLELISM,
            max_season: DEFAULT_MAX_SEASON,
        }
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE))
}

fn app_data_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

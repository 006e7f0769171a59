use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },

    #[error("no row in {table} for {key}")]
    NotFound { table: &'static str, key: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. } | Self::NotFound { .. })
    }
}

/// Failure classes seen by the remote adapter. Never crosses the
/// `RemoteSource` boundary; callers only observe empty results.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("http {status}: {snippet}")]
    Status { status: u16, snippet: String },

    #[error("request timed out")]
    Timeout,

    #[error("invalid payload: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed record: missing {missing}")]
pub struct MalformedRecord {
    pub missing: &'static str,
}

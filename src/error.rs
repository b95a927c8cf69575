//! Error types for autocrawl.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// DNS lookup failed. The only failure class the crawler retries.
    #[error("name resolution failed: {0}")]
    NameResolution(String),

    #[error("remote api error: {0}")]
    Api(String),

    #[error("remote api returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("bad pagination metadata: {0}")]
    Pagination(String),

    #[error("worker launch failed: {0}")]
    Launch(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Should the failed action be deferred for a later attempt?
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NameResolution(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

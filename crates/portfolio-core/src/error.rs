//! Error types for the portfolio domain.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Stored text did not map onto a known enum value.
    #[error("Corrupt record: {0}")]
    Decode(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    #[error("{0}")]
    Validation(String),

    #[error("ML service error: {message}")]
    MlService { message: String, status: Option<u16> },
}

impl Error {
    /// True for failures of the ML scoring service, including transport errors.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::MlService { .. } | Error::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for newsdesk

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsdeskError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Upstream rate limit exceeded")]
    UpstreamRateLimited,

    #[error("API error: {code} - {message}")]
    ApiError {
        code: String,
        message: String,
    },

    #[error("Invalid data: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl NewsdeskError {
    /// Whether the error came from bad caller input rather than a failure
    pub fn is_validation(&self) -> bool {
        matches!(self, NewsdeskError::ValidationError(_))
    }
}

pub type Result<T> = std::result::Result<T, NewsdeskError>;

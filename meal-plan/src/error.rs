//! Error type for the meal planner

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised outside the scheduling core.
///
/// Generation, the override codec and override layering never fail; only
/// configuration loading, persistence and the HTTP surface produce these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Menu parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Query encoding error: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Menu configuration is structurally invalid
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

//! Error types for the search library.

use thiserror::Error;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Reasons a query is rejected before any session is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Nothing searchable remains after normalization.
    #[error("query is empty")]
    Empty,

    /// Fewer characters than the configured minimum.
    #[error("query must be at least {min} characters (got {actual})")]
    TooShort { min: usize, actual: usize },

    /// More characters than the configured maximum.
    #[error("query is too long: {actual} characters, maximum is {max}")]
    TooLong { max: usize, actual: usize },
}

/// Errors that can occur during search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A network round trip exceeded the performer's bound.
    #[error("{engine} timed out after {timeout_ms}ms fetching {url} (domain: {domain})")]
    Timeout {
        engine: String,
        domain: String,
        url: String,
        timeout_ms: u64,
    },

    /// No engines configured.
    #[error("No search engines configured")]
    NoEngines,

    /// Invalid query.
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// Builds a timeout error, deriving the domain from `url`.
    pub fn timeout(engine: impl Into<String>, url: &str, timeout_ms: u64) -> Self {
        let domain = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        Self::Timeout {
            engine: engine.into(),
            domain,
            url: url.to_string(),
            timeout_ms,
        }
    }

    /// Returns true for round trips cut short by the timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

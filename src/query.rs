//! Search query validation and tokenization.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::QueryError;
use crate::text::tokenize;

/// A validated query with its canonical token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The keywords as typed, trimmed.
    pub keywords: String,
    /// Sanitized, accent-folded, lowercased tokens without duplicates.
    pub tokens: Vec<String>,
}

impl SearchQuery {
    /// Validates `keywords` against the length bounds and tokenizes them.
    pub fn parse(keywords: &str, min_len: usize, max_len: usize) -> Result<Self, QueryError> {
        let keywords = keywords.trim();
        let actual = keywords.chars().count();
        if actual == 0 {
            return Err(QueryError::Empty);
        }
        if actual > max_len {
            return Err(QueryError::TooLong { max: max_len, actual });
        }
        if actual < min_len {
            return Err(QueryError::TooShort { min: min_len, actual });
        }
        let tokens = tokenize(keywords);
        if tokens.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(Self {
            keywords: keywords.to_string(),
            tokens,
        })
    }

    /// The query is an http(s) link rather than keywords.
    pub fn is_url(&self) -> bool {
        Url::parse(&self.keywords)
            .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
    }

    /// Links to `.torrent` files go to the keyword engines; other links go
    /// to engines that resolve URLs directly.
    pub fn targets_url_engines(&self) -> bool {
        self.is_url() && !self.keywords.to_lowercase().ends_with(".torrent")
    }
}

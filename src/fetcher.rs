//! Page fetcher abstraction for retrieving raw engine responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// HTTP method and body of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Method {
    #[default]
    Get,
    /// Form or raw body with an explicit content type.
    Post { body: String, content_type: String },
    /// JSON body, sent as `application/json`.
    PostJson { body: String },
}

/// A request built by a search pattern or crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub url: String,
    /// Extra headers, sent in order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            method: Method::Post {
                body: body.into(),
                content_type: content_type.into(),
            },
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::PostJson { body: body.into() },
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Trait for fetching the body of a request.
///
/// All transport configuration (user-agent, proxies, TLS) is set at
/// construction time; `fetch` is a simple request-in, body-out interface.
/// Callers bound each fetch with their own timeout.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the response body of the given request.
    async fn fetch(&self, request: &Request) -> Result<String>;
}

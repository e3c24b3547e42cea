//! HTTP-based page fetcher using reqwest.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::fetcher::{Method, PageFetcher, Request};
use crate::Result;

const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; fedsearch/", env!("CARGO_PKG_VERSION"), ")");

/// A page fetcher that issues plain HTTP requests via reqwest.
///
/// Responses with a non-success status are reported as errors.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a new `HttpFetcher` with default settings.
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Creates an `HttpFetcher` with a custom reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<String> {
        let mut builder = match &request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post { body, content_type } => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, content_type.as_str())
                .body(body.clone()),
            Method::PostJson { body } => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(url = %request.url, "Fetching");
        let response = builder.send().await?.error_for_status()?;
        let body = response.text().await?;
        Ok(body)
    }
}

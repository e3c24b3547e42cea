//! Search engine traits, configuration and the engine registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetcher::{PageFetcher, Request};
use crate::performer::SearchPerformer;
use crate::{Result, SearchQuery, SearchResult, SearchToken};

/// Configuration for a search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stable identifier (e.g., "tpb").
    pub id: String,
    /// Display name, also the `source` of the results the engine produces.
    pub name: String,
    /// Whether the engine is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Bound on every network round trip, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum number of preliminary results crawled per run.
    #[serde(default = "default_max_crawls")]
    pub max_crawls: usize,
    /// Number of crawls in flight at once.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: usize,
    /// Whether the engine resolves URL-like queries directly.
    #[serde(default)]
    pub accepts_urls: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_crawls() -> usize {
    100
}

fn default_crawl_concurrency() -> usize {
    4
}

impl EngineConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            enabled: default_enabled(),
            timeout_ms: default_timeout_ms(),
            max_crawls: default_max_crawls(),
            crawl_concurrency: default_crawl_concurrency(),
            accepts_urls: false,
        }
    }
}

/// How an engine turns keywords into a request, and a response into results.
pub trait SearchPattern: Send + Sync {
    /// Builds the search request for the given keywords.
    fn build_request(&self, keywords: &str) -> Result<Request>;

    /// Parses a response body. Results needing a crawl are marked preliminary.
    fn parse_response(&self, body: &str) -> Result<Vec<SearchResult>>;
}

/// Resolves one preliminary result into complete results with a detail fetch.
#[async_trait]
pub trait CrawlingStrategy: Send + Sync {
    async fn crawl(&self, fetcher: &dyn PageFetcher, result: &SearchResult) -> Result<Vec<SearchResult>>;
}

/// Trait for implementing search engines.
///
/// An engine is a descriptor plus a factory for per-session performers.
pub trait Engine: Send + Sync {
    /// Returns the engine configuration.
    fn config(&self) -> &EngineConfig;

    /// Creates a fresh performer for one session.
    fn performer(&self, token: SearchToken, keywords: &str) -> SearchPerformer;

    /// Whether any required setup has completed. Engines that are not
    /// ready are skipped when a search starts.
    fn is_ready(&self) -> bool {
        true
    }

    /// Returns the engine id.
    fn id(&self) -> &str {
        &self.config().id
    }

    /// Returns the engine name.
    fn name(&self) -> &str {
        &self.config().name
    }

    fn accepts_urls(&self) -> bool {
        self.config().accepts_urls
    }
}

/// An engine assembled from a search pattern, an optional crawling
/// strategy and a fetcher.
pub struct PatternEngine {
    config: EngineConfig,
    pattern: Arc<dyn SearchPattern>,
    crawler: Option<Arc<dyn CrawlingStrategy>>,
    fetcher: Arc<dyn PageFetcher>,
    ready: AtomicBool,
}

impl PatternEngine {
    pub fn new(
        config: EngineConfig,
        pattern: Arc<dyn SearchPattern>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            config,
            pattern,
            crawler: None,
            fetcher,
            ready: AtomicBool::new(true),
        }
    }

    pub fn with_crawler(mut self, crawler: Arc<dyn CrawlingStrategy>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

impl Engine for PatternEngine {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn performer(&self, token: SearchToken, keywords: &str) -> SearchPerformer {
        let mut performer = SearchPerformer::new(
            token,
            keywords,
            &self.config.name,
            Arc::clone(&self.pattern),
            Arc::clone(&self.fetcher),
        )
        .with_timeout(self.config.timeout())
        .with_max_crawls(self.config.max_crawls)
        .with_crawl_concurrency(self.config.crawl_concurrency);
        if let Some(crawler) = &self.crawler {
            performer = performer.with_crawler(Arc::clone(crawler));
        }
        performer
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

struct Registered {
    engine: Arc<dyn Engine>,
    enabled: AtomicBool,
}

/// The list of known engines.
///
/// Membership is fixed once the registry is shared; only the per-engine
/// enabled switch changes afterwards.
#[derive(Default)]
pub struct EngineRegistry {
    entries: Vec<Registered>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an engine, enabled according to its configuration.
    pub fn register(&mut self, engine: impl Engine + 'static) {
        self.register_arc(Arc::new(engine));
    }

    pub fn register_arc(&mut self, engine: Arc<dyn Engine>) {
        let enabled = AtomicBool::new(engine.config().enabled);
        self.entries.push(Registered { engine, enabled });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn engines(&self) -> impl Iterator<Item = &Arc<dyn Engine>> {
        self.entries.iter().map(|e| &e.engine)
    }

    fn entry(&self, name_or_id: &str) -> Option<&Registered> {
        self.entries
            .iter()
            .find(|e| e.engine.name() == name_or_id || e.engine.id() == name_or_id)
    }

    /// Looks an engine up by exact name or id.
    pub fn get(&self, name_or_id: &str) -> Option<&Arc<dyn Engine>> {
        self.entry(name_or_id).map(|e| &e.engine)
    }

    pub fn is_enabled(&self, name_or_id: &str) -> bool {
        self.entry(name_or_id)
            .is_some_and(|e| e.enabled.load(Ordering::Acquire))
    }

    /// Returns false when no such engine is registered.
    pub fn set_enabled(&self, name_or_id: &str, enabled: bool) -> bool {
        match self.entry(name_or_id) {
            Some(entry) => {
                entry.enabled.store(enabled, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Engines that should serve `query`: URL resolvers for links, every
    /// enabled and ready engine otherwise.
    pub fn select(&self, query: &SearchQuery) -> Vec<Arc<dyn Engine>> {
        let url_query = query.targets_url_engines();
        self.entries
            .iter()
            .filter(|e| e.enabled.load(Ordering::Acquire) && e.engine.is_ready())
            .filter(|e| !url_query || e.engine.accepts_urls())
            .map(|e| Arc::clone(&e.engine))
            .collect()
    }

    /// Finds the engine a result's `source` belongs to. Sources may carry a
    /// suffix after the engine name; the longest matching name wins.
    pub fn resolve_source(&self, source: &str) -> Option<&Arc<dyn Engine>> {
        self.entries
            .iter()
            .map(|e| &e.engine)
            .filter(|engine| !engine.name().is_empty() && source.starts_with(engine.name()))
            .max_by_key(|engine| engine.name().len())
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.engine.name()))
            .finish()
    }
}

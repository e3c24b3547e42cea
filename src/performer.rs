//! The per-session, per-engine unit of work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{CrawlingStrategy, SearchPattern};
use crate::fetcher::PageFetcher;
use crate::manager::SearchSignal;
use crate::{Result, SearchError, SearchResult, SearchToken};

/// Runs one engine's query, and optional crawl step, for one session.
///
/// The pattern turns keywords into a request and the response into results.
/// With a crawling strategy, complete results are reported right away and
/// each preliminary result is crawled separately; a failed crawl drops only
/// that result. Every round trip is bounded by the performer's timeout.
///
/// Clones share the same cancellation state.
#[derive(Clone)]
pub struct SearchPerformer {
    token: SearchToken,
    keywords: String,
    engine: String,
    pattern: Arc<dyn SearchPattern>,
    crawler: Option<Arc<dyn CrawlingStrategy>>,
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
    max_crawls: usize,
    crawl_concurrency: usize,
    cancel: CancellationToken,
}

impl SearchPerformer {
    pub fn new(
        token: SearchToken,
        keywords: impl Into<String>,
        engine: impl Into<String>,
        pattern: Arc<dyn SearchPattern>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            token,
            keywords: keywords.into(),
            engine: engine.into(),
            pattern,
            crawler: None,
            fetcher,
            timeout: Duration::from_millis(5000),
            max_crawls: 100,
            crawl_concurrency: 4,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_crawler(mut self, crawler: Arc<dyn CrawlingStrategy>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_crawls(mut self, max_crawls: usize) -> Self {
        self.max_crawls = max_crawls;
        self
    }

    pub fn with_crawl_concurrency(mut self, concurrency: usize) -> Self {
        self.crawl_concurrency = concurrency.max(1);
        self
    }

    pub fn token(&self) -> SearchToken {
        self.token
    }

    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    /// Name of the engine this performer runs for.
    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_crawler(&self) -> bool {
        self.crawler.is_some()
    }

    /// Starts the work on the runtime without blocking the caller.
    pub fn start(&self, tx: mpsc::UnboundedSender<SearchSignal>) -> JoinHandle<()> {
        let performer = self.clone();
        tokio::spawn(async move { performer.perform(&tx).await })
    }

    /// Requests cancellation. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs to completion, reporting through `tx`. Returns early once
    /// stopped; nothing is reported after that.
    pub async fn perform(&self, tx: &mpsc::UnboundedSender<SearchSignal>) {
        let results = match self.search().await {
            Ok(Some(results)) => results,
            Ok(None) => return,
            Err(error) => {
                self.report_error(tx, error);
                return;
            }
        };
        debug!(engine = %self.engine, token = %self.token, count = results.len(), "Parsed results");

        let Some(crawler) = self.crawler.as_deref() else {
            self.emit(tx, results);
            return;
        };

        let (preliminary, complete): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|r| r.preliminary);
        self.emit(tx, complete);
        self.crawl_all(crawler, preliminary, tx).await;
    }

    async fn search(&self) -> Result<Option<Vec<SearchResult>>> {
        if self.is_stopped() {
            return Ok(None);
        }
        let request = self.pattern.build_request(&self.keywords)?;
        let Some(body) = self.bounded(&request.url, self.fetcher.fetch(&request)).await? else {
            return Ok(None);
        };
        if self.is_stopped() {
            return Ok(None);
        }
        let results = self.pattern.parse_response(&body)?;
        if self.is_stopped() {
            return Ok(None);
        }
        Ok(Some(results))
    }

    async fn crawl_all(
        &self,
        crawler: &dyn CrawlingStrategy,
        preliminary: Vec<SearchResult>,
        tx: &mpsc::UnboundedSender<SearchSignal>,
    ) {
        if preliminary.len() > self.max_crawls {
            debug!(
                engine = %self.engine,
                skipped = preliminary.len() - self.max_crawls,
                "Crawl limit reached"
            );
        }

        let fetcher = self.fetcher.as_ref();
        let mut crawls = stream::iter(preliminary.into_iter().take(self.max_crawls))
            .map(|parent| async move {
                let outcome = self
                    .bounded(&parent.details_url, crawler.crawl(fetcher, &parent))
                    .await;
                (parent, outcome)
            })
            .buffer_unordered(self.crawl_concurrency);

        while let Some((parent, outcome)) = crawls.next().await {
            match outcome {
                Ok(Some(children)) => {
                    let children = children
                        .into_iter()
                        .map(|child| {
                            if child.is_crawled() {
                                child
                            } else {
                                child.crawled_from(&parent)
                            }
                        })
                        .collect();
                    self.emit(tx, children);
                }
                Ok(None) => return,
                Err(error) => warn!(
                    engine = %self.engine,
                    result = %parent.display_name,
                    error = %error,
                    "Crawl failed, dropping result"
                ),
            }
        }
    }

    /// Races `fut` against cancellation and the timeout. `Ok(None)` means stopped.
    async fn bounded<T>(&self, url: &str, fut: impl Future<Output = Result<T>>) -> Result<Option<T>> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(None),
            outcome = tokio::time::timeout(self.timeout, fut) => match outcome {
                Ok(result) => result.map(Some),
                Err(_) => Err(SearchError::timeout(
                    self.engine.as_str(),
                    url,
                    u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            },
        }
    }

    fn emit(&self, tx: &mpsc::UnboundedSender<SearchSignal>, results: Vec<SearchResult>) {
        if results.is_empty() || self.is_stopped() {
            return;
        }
        let _ = tx.send(SearchSignal::Results {
            token: self.token,
            engine: self.engine.clone(),
            results,
        });
    }

    fn report_error(&self, tx: &mpsc::UnboundedSender<SearchSignal>, error: SearchError) {
        if self.is_stopped() {
            return;
        }
        warn!(engine = %self.engine, token = %self.token, error = %error, "Search failed");
        let _ = tx.send(SearchSignal::Error {
            token: self.token,
            engine: self.engine.clone(),
            error,
        });
    }
}

impl std::fmt::Debug for SearchPerformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPerformer")
            .field("token", &self.token)
            .field("engine", &self.engine)
            .field("keywords", &self.keywords)
            .field("crawler", &self.crawler.is_some())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

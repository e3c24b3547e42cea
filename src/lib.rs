//! # fedsearch
//!
//! Federated search over many independent, unreliable engines, with
//! incremental relevance ranking.
//!
//! A search session fans out to every enabled engine at once and streams
//! results back as each engine answers:
//!
//! - Concurrent performers per engine, each bounded by a timeout and
//!   isolated from the others' failures
//! - Optional crawl step resolving preliminary results one by one
//! - Session tokens keeping concurrent searches apart, with cancellation
//! - Relevance ranking mixing edit distance, token coverage and seed count
//! - User keyword filters over the held result set, with suggestions drawn
//!   from recurring terms
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fedsearch::{ChannelSink, HttpFetcher, SearchEvent, SearchMediator, Settings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_file("engines.json")?;
//!     let registry = settings.build_registry(Arc::new(HttpFetcher::new()?))?;
//!     let (sink, mut events) = ChannelSink::new();
//!     let mediator = SearchMediator::new(Arc::new(registry), settings.search, Arc::new(sink));
//!
//!     let token = mediator.trigger_search("big buck bunny")?;
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SearchEvent::Results { results, .. } => {
//!                 for ranked in results {
//!                     println!("{:.2} {}", ranked.relevance(), ranked.result.display_name);
//!                 }
//!             }
//!             SearchEvent::Finished { token: t } if t == token => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod query;
mod result;

pub mod config;
pub mod engine;
pub mod fetcher;
pub mod fetcher_http;
pub mod filter;
pub mod keywords;
pub mod manager;
pub mod mediator;
pub mod patterns;
pub mod performer;
pub mod ranking;
pub mod sink;
pub mod text;

pub use config::{EngineDefinition, SearchConfig, Settings, StopPolicy};
pub use engine::{CrawlingStrategy, Engine, EngineConfig, EngineRegistry, PatternEngine, SearchPattern};
pub use error::{QueryError, Result, SearchError};
pub use fetcher::{Method, PageFetcher, Request};
pub use fetcher_http::HttpFetcher;
pub use filter::{FilterPipeline, FilteredResults, KeywordFilter};
pub use keywords::KeywordDetector;
pub use manager::{SearchManager, SearchSignal};
pub use mediator::SearchMediator;
pub use patterns::{SelectorCrawler, SelectorCrawlerConfig, SelectorPattern, SelectorPatternConfig};
pub use performer::SearchPerformer;
pub use query::SearchQuery;
pub use ranking::{RankedResult, RankingMetrics, RankingWeights};
pub use result::{parse_info_hash, ResultKind, SearchResult, SearchToken, StreamingMetadata, TorrentMetadata};
pub use sink::{ChannelSink, ResultSink, SearchEvent};

//! Search settings and JSON-described engines.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{EngineConfig, EngineRegistry, PatternEngine};
use crate::fetcher::PageFetcher;
use crate::patterns::{SelectorCrawler, SelectorCrawlerConfig, SelectorPattern, SelectorPatternConfig};
use crate::ranking::RankingWeights;
use crate::{Result, SearchError, SearchQuery};

/// Whether starting a search stops the searches already running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Every new search stops the previous ones.
    StopPrevious,
    /// Keyword searches stop the previous ones; URL-like queries run
    /// alongside them.
    #[default]
    StopPreviousUnlessUrl,
    /// Searches never stop each other.
    Never,
}

impl StopPolicy {
    pub fn should_stop_previous(&self, query: &SearchQuery) -> bool {
        match self {
            Self::StopPrevious => true,
            Self::StopPreviousUnlessUrl => !query.is_url(),
            Self::Never => false,
        }
    }
}

/// Session-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Round-trip bound for engine definitions that set no `timeout_ms`.
    #[serde(default = "default_performer_timeout_ms")]
    pub performer_timeout_ms: u64,
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    #[serde(default)]
    pub stop_policy: StopPolicy,
    #[serde(default)]
    pub ranking: RankingWeights,
    /// Finished sessions kept for later queries before the oldest go.
    #[serde(default = "default_max_finished_sessions")]
    pub max_finished_sessions: usize,
}

fn default_performer_timeout_ms() -> u64 {
    5000
}

fn default_min_query_length() -> usize {
    1
}

fn default_max_query_length() -> usize {
    512
}

fn default_max_finished_sessions() -> usize {
    32
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            performer_timeout_ms: default_performer_timeout_ms(),
            min_query_length: default_min_query_length(),
            max_query_length: default_max_query_length(),
            stop_policy: StopPolicy::default(),
            ranking: RankingWeights::default(),
            max_finished_sessions: default_max_finished_sessions(),
        }
    }
}

/// An engine described entirely in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDefinition {
    #[serde(flatten)]
    pub config: EngineConfig,
    pub pattern: SelectorPatternConfig,
    #[serde(default)]
    pub crawler: Option<SelectorCrawlerConfig>,
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub engines: Vec<EngineDefinition>,
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        let default_timeout = value.pointer("/search/performer_timeout_ms").cloned();
        if let (Some(timeout), Some(engines)) = (
            default_timeout,
            value.get_mut("engines").and_then(|e| e.as_array_mut()),
        ) {
            for engine in engines.iter_mut().filter_map(|e| e.as_object_mut()) {
                engine
                    .entry("timeout_ms")
                    .or_insert_with(|| timeout.clone());
            }
        }
        let settings: Self = serde_json::from_value(value)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading settings from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.search.min_query_length > self.search.max_query_length {
            return Err(SearchError::Config(format!(
                "min_query_length {} exceeds max_query_length {}",
                self.search.min_query_length, self.search.max_query_length
            )));
        }
        for (i, engine) in self.engines.iter().enumerate() {
            if engine.config.name.is_empty() {
                return Err(SearchError::Config(format!("engine #{} has no name", i)));
            }
            let duplicate = self.engines[..i]
                .iter()
                .any(|e| e.config.name == engine.config.name || e.config.id == engine.config.id);
            if duplicate {
                return Err(SearchError::Config(format!(
                    "duplicate engine {:?}",
                    engine.config.name
                )));
            }
        }
        Ok(())
    }

    /// Builds one selector-driven engine per definition, sharing `fetcher`.
    pub fn build_registry(&self, fetcher: Arc<dyn PageFetcher>) -> Result<EngineRegistry> {
        let mut registry = EngineRegistry::new();
        for definition in &self.engines {
            let pattern = SelectorPattern::new(&definition.config.name, definition.pattern.clone())?;
            let mut engine = PatternEngine::new(
                definition.config.clone(),
                Arc::new(pattern),
                Arc::clone(&fetcher),
            );
            if let Some(crawler) = &definition.crawler {
                engine = engine.with_crawler(Arc::new(SelectorCrawler::new(crawler.clone())?));
            }
            registry.register(engine);
        }
        Ok(registry)
    }
}

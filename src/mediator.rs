//! Search sessions: starting, stopping, filtering and ranking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::engine::EngineRegistry;
use crate::error::QueryError;
use crate::filter::{FilterPipeline, FilteredResults};
use crate::keywords::{Feature, KeywordDetector};
use crate::manager::{SearchManager, SearchSignal};
use crate::ranking::{sort_by_relevance, RankedResult};
use crate::sink::ResultSink;
use crate::text::matches_all_tokens;
use crate::{Result, SearchError, SearchQuery, SearchResult, SearchToken};

struct Session {
    query: SearchQuery,
    results: FilteredResults<RankedResult>,
    keywords: KeywordDetector,
    /// Late batches are dropped once set.
    stopped: bool,
    /// Every performer has quiesced.
    finished: bool,
}

impl Session {
    fn new(query: SearchQuery, pipeline: FilterPipeline) -> Self {
        let mut results = FilteredResults::new();
        results.set_pipeline(pipeline);
        Self {
            query,
            results,
            keywords: KeywordDetector::new(),
            stopped: false,
            finished: false,
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped && !self.finished
    }
}

struct Shared {
    registry: Arc<EngineRegistry>,
    config: SearchConfig,
    sink: Arc<dyn ResultSink>,
    manager: SearchManager,
    sessions: Mutex<HashMap<SearchToken, Session>>,
}

impl Shared {
    fn sessions(&self) -> MutexGuard<'_, HashMap<SearchToken, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, signal: SearchSignal) {
        match signal {
            SearchSignal::Results {
                token,
                engine,
                results,
            } => self.on_results(token, &engine, results),
            SearchSignal::Error {
                token,
                engine,
                error,
            } => self.on_error(token, &engine, &error),
            SearchSignal::Stopped { token } => self.on_stopped(token),
        }
    }

    fn on_results(&self, token: SearchToken, engine: &str, results: Vec<SearchResult>) {
        let accepted = {
            let mut sessions = self.sessions();
            let Some(session) = sessions.get_mut(&token) else {
                debug!("Dropping {} results from {} for unknown session {}", results.len(), engine, token);
                return;
            };
            if !session.is_live() {
                debug!("Dropping {} late results from {} for session {}", results.len(), engine, token);
                return;
            }

            let mut accepted = Vec::new();
            for result in results {
                let Some(source) = self.registry.resolve_source(&result.source) else {
                    warn!("Dropping result {:?} from unknown source {:?}", result.display_name, result.source);
                    continue;
                };
                if result.is_crawled() && !matches_all_tokens(&result, &session.query.tokens) {
                    debug!("Crawled result {:?} does not match every token", result.display_name);
                    continue;
                }
                let ranked = RankedResult::new(
                    result,
                    source.name(),
                    session.query.keywords.as_str(),
                    self.config.ranking,
                );
                session.keywords.add_result(&ranked.result);
                if session.results.push(ranked.clone()) {
                    accepted.push(ranked);
                }
            }
            accepted
        };

        debug!("Session {}: {} results accepted from {}", token, accepted.len(), engine);
        if !accepted.is_empty() {
            self.sink.on_ranked_results(token, accepted);
        }
    }

    fn on_error(&self, token: SearchToken, engine: &str, error: &SearchError) {
        let live = self.sessions().get(&token).is_some_and(Session::is_live);
        if live {
            warn!("Engine {} failed for session {}: {}", engine, token, error);
            self.sink.on_engine_error(token, engine, &error.to_string());
        }
    }

    fn on_stopped(&self, token: SearchToken) {
        let known = match self.sessions().get_mut(&token) {
            Some(session) => {
                session.finished = true;
                true
            }
            None => false,
        };
        if known {
            info!("Session {} finished", token);
            self.sink.on_session_finished(token);
        }
    }

    fn stop(&self, token: SearchToken) {
        if let Some(session) = self.sessions().get_mut(&token) {
            session.stopped = true;
        }
        self.manager.stop_token(token);
    }

    /// Forgets the oldest finished sessions beyond the configured cap.
    /// Live sessions are never dropped.
    fn prune_finished(&self) {
        let mut sessions = self.sessions();
        let mut finished: Vec<SearchToken> = sessions
            .iter()
            .filter(|(_, s)| s.finished)
            .map(|(token, _)| *token)
            .collect();
        let cap = self.config.max_finished_sessions;
        if finished.len() <= cap {
            return;
        }
        finished.sort();
        for token in &finished[..finished.len() - cap] {
            debug!("Forgetting finished session {}", token);
            sessions.remove(token);
        }
    }

    fn stop_all(&self) {
        let live: Vec<SearchToken> = self
            .sessions()
            .iter_mut()
            .filter(|(_, s)| s.is_live())
            .map(|(token, s)| {
                s.stopped = true;
                *token
            })
            .collect();
        for token in live {
            debug!("Stopping previous session {}", token);
            self.manager.stop_token(token);
        }
    }
}

/// Runs search sessions over an engine registry and reports ranked results
/// to a sink.
///
/// Each session is identified by the token [`SearchMediator::trigger_search`]
/// returns. Results reach the sink batch by batch as engines answer; a
/// session ends with exactly one `on_session_finished` once all its engines
/// have quiesced, and nothing is reported for it afterwards.
///
/// Must be created inside a Tokio runtime.
pub struct SearchMediator {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl SearchMediator {
    pub fn new(registry: Arc<EngineRegistry>, config: SearchConfig, sink: Arc<dyn ResultSink>) -> Self {
        let (manager, rx) = SearchManager::new();
        let shared = Arc::new(Shared {
            registry,
            config,
            sink,
            manager,
            sessions: Mutex::new(HashMap::new()),
        });
        let dispatcher = tokio::spawn(dispatch(Arc::clone(&shared), rx));
        Self { shared, dispatcher }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.shared.registry
    }

    pub fn config(&self) -> &SearchConfig {
        &self.shared.config
    }

    /// Validates `keywords` and starts a session on every selected engine.
    ///
    /// Finished sessions keep their results until [`close_session`] or
    /// until more than `max_finished_sessions` have piled up, at which
    /// point the oldest are forgotten.
    ///
    /// [`close_session`]: SearchMediator::close_session
    pub fn trigger_search(&self, keywords: &str) -> std::result::Result<SearchToken, QueryError> {
        self.trigger_search_with_filters(keywords, FilterPipeline::default())
    }

    /// Like [`SearchMediator::trigger_search`], with keyword filters in
    /// place before the first batch arrives.
    pub fn trigger_search_with_filters(
        &self,
        keywords: &str,
        pipeline: FilterPipeline,
    ) -> std::result::Result<SearchToken, QueryError> {
        let config = &self.shared.config;
        let query = SearchQuery::parse(keywords, config.min_query_length, config.max_query_length)?;
        Ok(self.start(query, pipeline))
    }

    fn start(&self, query: SearchQuery, pipeline: FilterPipeline) -> SearchToken {
        let shared = &self.shared;
        if shared.config.stop_policy.should_stop_previous(&query) {
            shared.stop_all();
        }
        shared.prune_finished();

        let token = SearchToken::generate();
        let engines = shared.registry.select(&query);
        info!(
            "Session {} started for {:?} on {} engines",
            token,
            query.keywords,
            engines.len()
        );

        let performers = engines
            .iter()
            .map(|engine| engine.performer(token, &query.keywords))
            .collect();
        shared.sessions().insert(token, Session::new(query, pipeline));
        shared.manager.perform_all(token, performers);
        token
    }

    /// Stops a session. Batches still in flight are dropped; the session
    /// finishes once its performers have quiesced. Idempotent.
    pub fn stop_search(&self, token: SearchToken) {
        self.shared.stop(token);
    }

    /// Runs the query of an existing session again under a new token,
    /// keeping its keyword filters.
    pub fn repeat_search(&self, token: SearchToken) -> Result<SearchToken> {
        let previous = self
            .shared
            .sessions()
            .get(&token)
            .map(|s| (s.query.clone(), s.results.pipeline().clone()));
        let (query, pipeline) =
            previous.ok_or_else(|| SearchError::Other(format!("Unknown session {}", token)))?;
        Ok(self.start(query, pipeline))
    }

    /// Replaces the session's keyword filters and returns the new view.
    /// Batches arriving later go through the same filters.
    pub fn set_keyword_filters(&self, token: SearchToken, pipeline: FilterPipeline) -> Vec<RankedResult> {
        match self.shared.sessions().get_mut(&token) {
            Some(session) => {
                session.results.set_pipeline(pipeline);
                session.results.visible().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// The filtered view of a session, most relevant first.
    pub fn results(&self, token: SearchToken) -> Vec<RankedResult> {
        let mut results: Vec<RankedResult> = self
            .shared
            .sessions()
            .get(&token)
            .map(|s| s.results.visible().cloned().collect())
            .unwrap_or_default();
        sort_by_relevance(&mut results);
        results
    }

    /// Every result a session has accepted, filtered out or not.
    pub fn all_results(&self, token: SearchToken) -> Vec<RankedResult> {
        self.shared
            .sessions()
            .get(&token)
            .map(|s| s.results.all().to_vec())
            .unwrap_or_default()
    }

    /// Records a fresh seed count for the torrents behind `details_url` and
    /// returns the re-ranked entries.
    pub fn update_seeds(&self, token: SearchToken, details_url: &str, seeds: u32) -> Vec<RankedResult> {
        let mut sessions = self.shared.sessions();
        let Some(session) = sessions.get_mut(&token) else {
            return Vec::new();
        };
        session
            .results
            .all_mut()
            .iter_mut()
            .filter(|r| r.result.details_url == details_url)
            .filter_map(|r| r.set_seeds(seeds).then(|| r.clone()))
            .collect()
    }

    /// Term counts for one feature over everything the session accepted.
    pub fn keyword_histogram(&self, token: SearchToken, feature: Feature) -> Vec<(String, usize)> {
        self.shared
            .sessions()
            .get(&token)
            .map(|s| s.keywords.histogram(feature))
            .unwrap_or_default()
    }

    /// Recurring terms worth offering as keyword filters.
    pub fn keyword_suggestions(&self, token: SearchToken, feature: Feature) -> Vec<(String, usize)> {
        self.shared
            .sessions()
            .get(&token)
            .map(|s| s.keywords.suggestions(feature))
            .unwrap_or_default()
    }

    pub fn query(&self, token: SearchToken) -> Option<SearchQuery> {
        self.shared.sessions().get(&token).map(|s| s.query.clone())
    }

    /// Whether the session exists and has not finished.
    pub fn is_active(&self, token: SearchToken) -> bool {
        self.shared
            .sessions()
            .get(&token)
            .is_some_and(|s| !s.finished)
    }

    /// Stops the session if needed and forgets its state.
    pub fn close_session(&self, token: SearchToken) -> bool {
        self.shared.stop(token);
        self.shared.sessions().remove(&token).is_some()
    }

    /// Stops every session.
    pub fn shutdown(&self) {
        self.shared.stop_all();
        self.shared.manager.stop();
    }
}

impl Drop for SearchMediator {
    fn drop(&mut self) {
        self.shared.manager.stop();
        self.dispatcher.abort();
    }
}

async fn dispatch(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<SearchSignal>) {
    while let Some(signal) = rx.recv().await {
        shared.handle(signal);
    }
}

//! Concurrent execution of performers with a single fan-in channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::performer::SearchPerformer;
use crate::{SearchError, SearchResult, SearchToken};

/// Everything a running search reports, tagged with its session token.
#[derive(Debug)]
pub enum SearchSignal {
    /// A batch of results from one engine.
    Results {
        token: SearchToken,
        engine: String,
        results: Vec<SearchResult>,
    },
    /// An engine failed; other engines keep running.
    Error {
        token: SearchToken,
        engine: String,
        error: SearchError,
    },
    /// Every performer of the session has quiesced. Sent once per session.
    Stopped { token: SearchToken },
}

impl SearchSignal {
    pub fn token(&self) -> SearchToken {
        match self {
            Self::Results { token, .. } | Self::Error { token, .. } | Self::Stopped { token } => *token,
        }
    }
}

struct Session {
    cancel: CancellationToken,
    pending: usize,
}

struct Inner {
    sessions: Mutex<HashMap<SearchToken, Session>>,
    tx: mpsc::UnboundedSender<SearchSignal>,
}

impl Inner {
    fn sessions(&self) -> MutexGuard<'_, HashMap<SearchToken, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish(&self, token: SearchToken) {
        let quiesced = {
            let mut sessions = self.sessions();
            match sessions.get_mut(&token) {
                Some(session) => {
                    session.pending = session.pending.saturating_sub(1);
                    if session.pending == 0 {
                        sessions.remove(&token);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if quiesced {
            debug!("Session {} quiesced", token);
            let _ = self.tx.send(SearchSignal::Stopped { token });
        }
    }
}

/// Runs performers concurrently and fans their output into one channel.
///
/// The receiver returned by [`SearchManager::new`] sees every signal in the
/// order it was sent; each performer's own batches keep their order.
#[derive(Clone)]
pub struct SearchManager {
    inner: Arc<Inner>,
}

impl SearchManager {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SearchSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            sessions: Mutex::new(HashMap::new()),
            tx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Registers and starts one performer.
    pub fn perform(&self, performer: SearchPerformer) {
        let token = performer.token();
        self.perform_all(token, vec![performer]);
    }

    /// Registers every performer of a session before starting any of them,
    /// so a fast performer cannot finish the session early. With no
    /// performers the session stops immediately.
    pub fn perform_all(&self, token: SearchToken, performers: Vec<SearchPerformer>) {
        if performers.is_empty() {
            if !self.is_active(token) {
                let _ = self.inner.tx.send(SearchSignal::Stopped { token });
            }
            return;
        }

        let cancel = {
            let mut sessions = self.inner.sessions();
            let session = sessions.entry(token).or_insert_with(|| Session {
                cancel: CancellationToken::new(),
                pending: 0,
            });
            session.pending += performers.len();
            session.cancel.clone()
        };

        for performer in performers {
            debug_assert_eq!(performer.token(), token);
            debug!("Starting {} for session {}", performer.engine(), token);
            let inner = Arc::clone(&self.inner);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => performer.stop(),
                    _ = performer.perform(&inner.tx) => {}
                }
                inner.finish(token);
            });
        }
    }

    /// Stops every live performer of `token`. Idempotent.
    pub fn stop_token(&self, token: SearchToken) {
        if let Some(session) = self.inner.sessions().get(&token) {
            debug!("Stopping session {}", token);
            session.cancel.cancel();
        }
    }

    /// Stops every live performer of every session. Idempotent.
    pub fn stop(&self) {
        for session in self.inner.sessions().values() {
            session.cancel.cancel();
        }
    }

    /// Whether `token` still has performers running.
    pub fn is_active(&self, token: SearchToken) -> bool {
        self.inner.sessions().contains_key(&token)
    }

    pub fn active_sessions(&self) -> Vec<SearchToken> {
        self.inner.sessions().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SearchPattern;
    use crate::fetcher::{PageFetcher, Request};
    use crate::Result;
    use async_trait::async_trait;
    use std::time::Duration;

    struct EchoPattern;

    impl SearchPattern for EchoPattern {
        fn build_request(&self, keywords: &str) -> Result<Request> {
            Ok(Request::get(keywords))
        }

        fn parse_response(&self, body: &str) -> Result<Vec<SearchResult>> {
            Ok(vec![SearchResult::new(body, "Echo")])
        }
    }

    /// Answers with the request URL after `delay`.
    struct SlowFetcher {
        delay: Duration,
    }

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, request: &Request) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(request.url.clone())
        }
    }

    fn performer(token: SearchToken, keywords: &str, delay_ms: u64) -> SearchPerformer {
        SearchPerformer::new(
            token,
            keywords,
            "Echo",
            Arc::new(EchoPattern),
            Arc::new(SlowFetcher {
                delay: Duration::from_millis(delay_ms),
            }),
        )
        .with_timeout(Duration::from_secs(5))
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SearchSignal>) -> SearchSignal {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("signal within 5s")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_fan_in_and_single_stop() {
        let (manager, mut rx) = SearchManager::new();
        let token = SearchToken::generate();
        manager.perform_all(
            token,
            vec![performer(token, "fast", 0), performer(token, "slow", 50)],
        );
        assert!(manager.is_active(token));

        let mut names = Vec::new();
        let mut stopped = 0;
        while stopped == 0 {
            match next(&mut rx).await {
                SearchSignal::Results { results, .. } => names.push(results[0].display_name.clone()),
                SearchSignal::Stopped { token: t } => {
                    assert_eq!(t, token);
                    stopped += 1;
                }
                other => panic!("unexpected signal: {other:?}"),
            }
        }
        assert_eq!(names, vec!["fast", "slow"]);
        assert!(!manager.is_active(token));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_performers() {
        let (manager, mut rx) = SearchManager::new();
        let token = SearchToken::generate();
        manager.perform(performer(token, "slow", 2_000));
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.stop_token(token);
        manager.stop_token(token);

        match next(&mut rx).await {
            SearchSignal::Stopped { token: t } => assert_eq!(t, token),
            other => panic!("unexpected signal: {other:?}"),
        }
        assert!(manager.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_sessions() {
        let (manager, mut rx) = SearchManager::new();
        let t1 = SearchToken::generate();
        let t2 = SearchToken::generate();
        manager.perform(performer(t1, "a", 2_000));
        manager.perform(performer(t2, "b", 2_000));
        assert_eq!(manager.active_sessions().len(), 2);

        manager.stop();
        let mut stopped = vec![next(&mut rx).await.token(), next(&mut rx).await.token()];
        stopped.sort();
        let mut expected = vec![t1, t2];
        expected.sort();
        assert_eq!(stopped, expected);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let (manager, mut rx) = SearchManager::new();
        let t1 = SearchToken::generate();
        let t2 = SearchToken::generate();
        manager.perform(performer(t1, "one", 2_000));
        manager.perform(performer(t2, "two", 0));
        manager.stop_token(t1);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(next(&mut rx).await);
        }
        for signal in &seen {
            if let SearchSignal::Results { token, results, .. } = signal {
                assert_eq!(*token, t2);
                assert_eq!(results[0].display_name, "two");
            }
        }
        assert_eq!(seen.iter().filter(|s| matches!(s, SearchSignal::Stopped { .. })).count(), 2);
    }

    #[tokio::test]
    async fn test_no_performers_stops_immediately() {
        let (manager, mut rx) = SearchManager::new();
        let token = SearchToken::generate();
        manager.perform_all(token, Vec::new());
        assert!(matches!(next(&mut rx).await, SearchSignal::Stopped { token: t } if t == token));
    }
}

//! The boundary between the search core and whatever presents results.

use tokio::sync::mpsc;

use crate::ranking::RankedResult;
use crate::SearchToken;

/// Receives ranked results as sessions progress.
///
/// Calls for one session never overlap; calls for different sessions may
/// interleave.
pub trait ResultSink: Send + Sync {
    /// A batch of newly accepted results, in arrival order.
    fn on_ranked_results(&self, token: SearchToken, results: Vec<RankedResult>);

    /// The session will deliver nothing more.
    fn on_session_finished(&self, token: SearchToken);

    /// One engine failed for the session.
    fn on_engine_error(&self, _token: SearchToken, _engine: &str, _message: &str) {}
}

/// Events emitted by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Results {
        token: SearchToken,
        results: Vec<RankedResult>,
    },
    Finished {
        token: SearchToken,
    },
    EngineError {
        token: SearchToken,
        engine: String,
        message: String,
    },
}

impl SearchEvent {
    pub fn token(&self) -> SearchToken {
        match self {
            Self::Results { token, .. } | Self::Finished { token } | Self::EngineError { token, .. } => {
                *token
            }
        }
    }
}

/// Forwards every sink call as a [`SearchEvent`] over a channel, for
/// consumers that drain on their own task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SearchEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SearchEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl ResultSink for ChannelSink {
    fn on_ranked_results(&self, token: SearchToken, results: Vec<RankedResult>) {
        self.send(SearchEvent::Results { token, results });
    }

    fn on_session_finished(&self, token: SearchToken) {
        self.send(SearchEvent::Finished { token });
    }

    fn on_engine_error(&self, token: SearchToken, engine: &str, message: &str) {
        self.send(SearchEvent::EngineError {
            token,
            engine: engine.to_string(),
            message: message.to_string(),
        });
    }
}

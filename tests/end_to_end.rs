//! Whole-session scenarios against in-memory engines.
//!
//! No network access: every engine is built from a canned pattern and a
//! fetcher that only sleeps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::assert_ok;

use fedsearch::{
    ChannelSink, CrawlingStrategy, EngineConfig, EngineRegistry, PageFetcher, PatternEngine,
    RankedResult, RankingWeights, Request, Result, SearchConfig, SearchEvent, SearchMediator,
    SearchPattern, SearchResult, SearchToken, StopPolicy, TorrentMetadata,
};

/// Answers with the request URL after `delay`.
struct SleepyFetcher {
    delay: Duration,
}

#[async_trait]
impl PageFetcher for SleepyFetcher {
    async fn fetch(&self, request: &Request) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(request.url.clone())
    }
}

/// Always returns the same results.
struct CannedPattern {
    results: Vec<SearchResult>,
}

impl SearchPattern for CannedPattern {
    fn build_request(&self, keywords: &str) -> Result<Request> {
        Ok(Request::get(format!(
            "https://canned.test/search?q={}",
            urlencoding::encode(keywords)
        )))
    }

    fn parse_response(&self, _body: &str) -> Result<Vec<SearchResult>> {
        Ok(self.results.clone())
    }
}

/// Returns one result named after the keywords.
struct EchoPattern {
    source: String,
}

impl SearchPattern for EchoPattern {
    fn build_request(&self, keywords: &str) -> Result<Request> {
        Ok(Request::get(keywords))
    }

    fn parse_response(&self, body: &str) -> Result<Vec<SearchResult>> {
        Ok(vec![SearchResult::new(body, self.source.as_str())])
    }
}

/// Resolves any preliminary result to the movie file after `delay`.
struct SlowFileCrawler {
    delay: Duration,
}

#[async_trait]
impl CrawlingStrategy for SlowFileCrawler {
    async fn crawl(&self, _fetcher: &dyn PageFetcher, result: &SearchResult) -> Result<Vec<SearchResult>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![SearchResult::new("big_buck_bunny.mp4", result.source.as_str())
            .with_filename("big_buck_bunny.mp4")
            .with_size(725_106_140)])
    }
}

fn engine(name: &str, pattern: Arc<dyn SearchPattern>, delay_ms: u64, timeout_ms: u64) -> PatternEngine {
    let config = EngineConfig {
        timeout_ms,
        ..EngineConfig::new(name.to_lowercase(), name)
    };
    PatternEngine::new(
        config,
        pattern,
        Arc::new(SleepyFetcher {
            delay: Duration::from_millis(delay_ms),
        }),
    )
}

fn canned(name: &str, results: Vec<SearchResult>, delay_ms: u64) -> PatternEngine {
    engine(name, Arc::new(CannedPattern { results }), delay_ms, 5000)
}

fn bunny_torrent(source: &str, seeds: u32) -> SearchResult {
    SearchResult::new("Big Buck Bunny 1080p", source)
        .with_details_url("https://a.test/torrent/1")
        .with_torrent(TorrentMetadata::new(
            "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c",
            seeds,
        ))
}

fn start(engines: Vec<PatternEngine>, config: SearchConfig) -> (SearchMediator, UnboundedReceiver<SearchEvent>) {
    let mut registry = EngineRegistry::new();
    for engine in engines {
        registry.register(engine);
    }
    let (sink, events) = ChannelSink::new();
    let mediator = SearchMediator::new(Arc::new(registry), config, Arc::new(sink));
    (mediator, events)
}

async fn next_event(events: &mut UnboundedReceiver<SearchEvent>) -> SearchEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event within 5s")
        .expect("sink closed")
}

/// Collects events until every token in `tokens` has finished.
async fn run_to_finish(events: &mut UnboundedReceiver<SearchEvent>, tokens: &[SearchToken]) -> Vec<SearchEvent> {
    let mut collected = Vec::new();
    let mut pending: Vec<SearchToken> = tokens.to_vec();
    while !pending.is_empty() {
        let event = next_event(events).await;
        if let SearchEvent::Finished { token } = &event {
            pending.retain(|t| t != token);
        }
        collected.push(event);
    }
    collected
}

fn batches(events: &[SearchEvent], token: SearchToken) -> Vec<Vec<RankedResult>> {
    events
        .iter()
        .filter_map(|e| match e {
            SearchEvent::Results { token: t, results } if *t == token => Some(results.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_two_engines_first_result_paints_first() {
    let engine_a = canned("A", vec![bunny_torrent("A", 120)], 0);
    let engine_b = engine(
        "B",
        Arc::new(CannedPattern {
            results: vec![SearchResult::new("Big Buck Bunny (2008) collection", "B")
                .with_details_url("https://b.test/details/bbb")
                .preliminary()],
        }),
        0,
        5000,
    )
    .with_crawler(Arc::new(SlowFileCrawler {
        delay: Duration::from_millis(150),
    }));

    let (mediator, mut events) = start(vec![engine_a, engine_b], SearchConfig::default());
    let token = assert_ok!(mediator.trigger_search("big buck bunny"));
    let collected = run_to_finish(&mut events, &[token]).await;

    let batches = batches(&collected, token);
    assert_eq!(batches.len(), 2, "one batch per engine: {batches:?}");

    let first = &batches[0][0];
    assert_eq!(first.engine, "A");
    assert_eq!(first.result.display_name, "Big Buck Bunny 1080p");
    assert_eq!(first.seeds_label, "120");

    let unseeded = RankedResult::new(bunny_torrent("A", 0), "A", "big buck bunny", RankingWeights::default());
    assert!(first.relevance() > unseeded.relevance());
    assert!(first.relevance() > 0.5);

    let second = &batches[1][0];
    assert_eq!(second.engine, "B");
    assert_eq!(second.result.display_name, "big_buck_bunny.mp4");
    assert!(second.result.is_crawled());
    assert_eq!(second.extension.as_deref(), Some("mp4"));

    let ranked = mediator.results(token);
    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].relevance() >= ranked[1].relevance());
}

#[tokio::test]
async fn test_crawled_results_missing_a_token_are_dropped() {
    struct OtherMovieCrawler;

    #[async_trait]
    impl CrawlingStrategy for OtherMovieCrawler {
        async fn crawl(&self, _fetcher: &dyn PageFetcher, result: &SearchResult) -> Result<Vec<SearchResult>> {
            Ok(vec![
                SearchResult::new("sintel.mp4", result.source.as_str()),
                SearchResult::new("buck_bunny.mp4", result.source.as_str()),
            ])
        }
    }

    let engine_b = canned(
        "B",
        vec![SearchResult::new("Open movies", "B")
            .with_details_url("https://b.test/details/open")
            .preliminary()],
        0,
    )
    .with_crawler(Arc::new(OtherMovieCrawler));

    let (mediator, mut events) = start(vec![engine_b], SearchConfig::default());
    let token = assert_ok!(mediator.trigger_search("big buck bunny"));
    let collected = run_to_finish(&mut events, &[token]).await;

    assert!(batches(&collected, token).is_empty());
    assert!(mediator.all_results(token).is_empty());
}

#[tokio::test]
async fn test_timed_out_engine_does_not_block_others() {
    let engine_a = canned("A", vec![bunny_torrent("A", 120)], 0);
    let engine_c = engine(
        "C",
        Arc::new(CannedPattern {
            results: vec![SearchResult::new("never delivered", "C")],
        }),
        3_000,
        100,
    );

    let (mediator, mut events) = start(vec![engine_a, engine_c], SearchConfig::default());
    let token = assert_ok!(mediator.trigger_search("big buck bunny"));
    let collected = run_to_finish(&mut events, &[token]).await;

    let names: Vec<_> = batches(&collected, token)
        .into_iter()
        .flatten()
        .map(|r| r.result.display_name)
        .collect();
    assert_eq!(names, vec!["Big Buck Bunny 1080p"]);

    let errors: Vec<_> = collected
        .iter()
        .filter_map(|e| match e {
            SearchEvent::EngineError { engine, message, .. } => Some((engine.as_str(), message.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "C");
    assert!(errors[0].1.contains("timed out"), "{}", errors[0].1);

    assert!(matches!(collected.last(), Some(SearchEvent::Finished { .. })));
    assert!(!mediator.is_active(token));
}

#[tokio::test]
async fn test_concurrent_sessions_never_cross() {
    let echo = engine(
        "Echo",
        Arc::new(EchoPattern {
            source: "Echo".to_string(),
        }),
        100,
        5000,
    );
    let config = SearchConfig {
        stop_policy: StopPolicy::Never,
        ..Default::default()
    };
    let (mediator, mut events) = start(vec![echo], config);

    let t1 = assert_ok!(mediator.trigger_search("alpha movie"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let t2 = assert_ok!(mediator.trigger_search("beta movie"));
    let collected = run_to_finish(&mut events, &[t1, t2]).await;

    let names = |token| -> Vec<String> {
        batches(&collected, token)
            .into_iter()
            .flatten()
            .map(|r| r.result.display_name)
            .collect()
    };
    assert_eq!(names(t1), vec!["alpha movie"]);
    assert_eq!(names(t2), vec!["beta movie"]);
}

#[tokio::test]
async fn test_nothing_is_delivered_after_stop() {
    let slow = canned("Slow", vec![bunny_torrent("Slow", 3)], 300);
    let (mediator, mut events) = start(vec![slow], SearchConfig::default());

    let token = assert_ok!(mediator.trigger_search("big buck bunny"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    mediator.stop_search(token);

    let collected = run_to_finish(&mut events, &[token]).await;
    assert_eq!(collected, vec![SearchEvent::Finished { token }]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(events.try_recv().is_err());
    assert!(mediator.results(token).is_empty());
}

#[tokio::test]
async fn test_new_keyword_search_replaces_the_previous_one() {
    let slow = canned("Slow", vec![bunny_torrent("Slow", 3)], 200);
    let resolver = {
        let config = EngineConfig {
            accepts_urls: true,
            ..EngineConfig::new("links", "Links")
        };
        PatternEngine::new(
            config,
            Arc::new(EchoPattern {
                source: "Links".to_string(),
            }),
            Arc::new(SleepyFetcher {
                delay: Duration::from_millis(200),
            }),
        )
    };
    let (mediator, mut events) = start(vec![slow, resolver], SearchConfig::default());

    let keywords = assert_ok!(mediator.trigger_search("big buck bunny"));
    let link = assert_ok!(mediator.trigger_search("https://videos.test/watch?v=bbb"));
    let collected = run_to_finish(&mut events, &[keywords, link]).await;

    // A link runs alongside the keyword search, on URL engines only.
    // Keyword searches reach every engine.
    let link_names: Vec<_> = batches(&collected, link)
        .into_iter()
        .flatten()
        .map(|r| r.engine)
        .collect();
    assert_eq!(link_names, vec!["Links"]);
    assert_eq!(batches(&collected, keywords).concat().len(), 2);

    // Another keyword search stops everything still running.
    let first = assert_ok!(mediator.trigger_search("big buck bunny"));
    let second = assert_ok!(mediator.trigger_search("sintel"));
    let collected = run_to_finish(&mut events, &[first, second]).await;
    assert!(batches(&collected, first).is_empty());
    assert_eq!(batches(&collected, second).concat().len(), 2);
}

#[tokio::test]
async fn test_keywords_starting_with_http_reach_keyword_engines() {
    let echo = engine(
        "Echo",
        Arc::new(EchoPattern {
            source: "Echo".to_string(),
        }),
        0,
        5000,
    );
    let (mediator, mut events) = start(vec![echo], SearchConfig::default());

    let first = assert_ok!(mediator.trigger_search("http server tutorial"));
    let query = mediator.query(first).unwrap();
    assert!(!query.is_url());

    let collected = run_to_finish(&mut events, &[first]).await;
    let names: Vec<_> = batches(&collected, first)
        .into_iter()
        .flatten()
        .map(|r| r.result.display_name)
        .collect();
    assert_eq!(names, vec!["http server tutorial"]);
}

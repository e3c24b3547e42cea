//! Integration tests against live sites using real HTTP requests.
//!
//! These tests are marked with `#[ignore]` by default because they require
//! network access and may be slow or flaky.
//!
//! Run with: `cargo test --test integration -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use fedsearch::{
    ChannelSink, HttpFetcher, PageFetcher, Request, SearchEvent, SearchMediator, SearchPattern,
    SelectorPattern, Settings,
};

const SETTINGS: &str = r#"{
    "search": { "performer_timeout_ms": 15000 },
    "engines": [
        {
            "id": "ddg",
            "name": "DuckDuckGo",
            "pattern": {
                "url_template": "https://html.duckduckgo.com/html/",
                "body_template": "q={keywords}",
                "item": ".result",
                "title": ".result__title a"
            }
        },
        {
            "id": "wiki",
            "name": "Wikipedia",
            "pattern": {
                "url_template": "https://en.wikipedia.org/w/index.php?search={keywords}&fulltext=1&ns0=1",
                "item": ".mw-search-result",
                "title": ".mw-search-result-heading a"
            }
        }
    ]
}"#;

fn pattern(settings: &Settings, name: &str) -> SelectorPattern {
    let definition = settings
        .engines
        .iter()
        .find(|e| e.config.name == name)
        .unwrap();
    SelectorPattern::new(name, definition.pattern.clone()).unwrap()
}

async fn run_pattern(pattern: &SelectorPattern, keywords: &str) -> usize {
    let fetcher = HttpFetcher::new().unwrap();
    let request = pattern.build_request(keywords).unwrap();
    match fetcher.fetch(&request).await {
        Ok(body) => {
            let results = pattern.parse_response(&body).unwrap();
            println!("{} returned {} results for '{}'", request.url, results.len(), keywords);
            for (i, result) in results.iter().take(3).enumerate() {
                println!("  {}. {} - {}", i + 1, result.display_name, result.details_url);
            }
            results.len()
        }
        Err(e) => {
            println!("{} failed: {}", request.url, e);
            0
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_duckduckgo_pattern() {
    let settings = Settings::from_json_str(SETTINGS).unwrap();
    let count = run_pattern(&pattern(&settings, "DuckDuckGo"), "big buck bunny").await;
    assert!(count > 0, "DuckDuckGo should return results");
}

#[tokio::test]
#[ignore]
async fn test_wikipedia_pattern() {
    let settings = Settings::from_json_str(SETTINGS).unwrap();
    let count = run_pattern(&pattern(&settings, "Wikipedia"), "big buck bunny").await;
    assert!(count > 0, "Wikipedia should return results");
}

#[tokio::test]
#[ignore]
async fn test_unreachable_host_is_an_error() {
    let fetcher = HttpFetcher::new().unwrap();
    let result = fetcher
        .fetch(&Request::get("https://fedsearch.invalid/search"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
#[ignore]
async fn test_live_session() {
    let settings = Settings::from_json_str(SETTINGS).unwrap();
    let registry = settings
        .build_registry(Arc::new(HttpFetcher::new().unwrap()))
        .unwrap();
    let (sink, mut events) = ChannelSink::new();
    let mediator = SearchMediator::new(Arc::new(registry), settings.search, Arc::new(sink));

    let token = mediator.trigger_search("big buck bunny").unwrap();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("session did not finish")
            .expect("sink closed");
        match event {
            SearchEvent::Results { results, .. } => {
                println!("{} results from {}", results.len(), results[0].engine);
            }
            SearchEvent::EngineError { engine, message, .. } => {
                println!("{} failed: {}", engine, message);
            }
            SearchEvent::Finished { token: t } if t == token => break,
            SearchEvent::Finished { .. } => {}
        }
    }

    let results = mediator.results(token);
    println!("{} results in total", results.len());
    for ranked in results.iter().take(5) {
        println!("  {:.2} {}", ranked.relevance(), ranked.result.display_name);
    }
    assert!(!results.is_empty(), "At least one engine should answer");
}

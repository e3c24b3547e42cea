//! Declarative HTML engines driven by CSS selectors.
//!
//! A [`SelectorPattern`] describes a result page: where each item lives and
//! which elements carry its title, link, size, seeds and magnet. A
//! [`SelectorCrawler`] does the same for a details page, turning a
//! preliminary result into a complete torrent result.

use std::collections::BTreeMap;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::engine::{CrawlingStrategy, SearchPattern};
use crate::fetcher::{PageFetcher, Request};
use crate::{Result, SearchError, SearchResult, TorrentMetadata};

const KEYWORDS_PLACEHOLDER: &str = "{keywords}";
const DEFAULT_MAGNET_SELECTOR: &str = r#"a[href^="magnet:"]"#;

fn default_content_type() -> String {
    "application/x-www-form-urlencoded".to_string()
}

/// Selectors and request template of a result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorPatternConfig {
    /// Search URL with a `{keywords}` placeholder.
    pub url_template: String,
    /// POST body with a `{keywords}` placeholder; GET when absent.
    #[serde(default)]
    pub body_template: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// One element per result.
    pub item: String,
    /// Title element, relative to the item.
    pub title: String,
    /// Link element; the title's own `href` when absent.
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub seeds: Option<String>,
    #[serde(default)]
    pub magnet: Option<String>,
    /// Results need a crawl of their details page.
    #[serde(default)]
    pub preliminary: bool,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| SearchError::Config(format!("Invalid selector {:?}: {:?}", css, e)))
}

fn optional_selector(css: Option<&str>) -> Result<Option<Selector>> {
    css.map(parse_selector).transpose()
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_text(scope: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let element = scope.select(selector?).next()?;
    let text = text_of(element);
    (!text.is_empty()).then_some(text)
}

fn select_href(scope: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    scope
        .select(selector?)
        .next()?
        .value()
        .attr("href")
        .map(str::to_string)
}

/// Digits of a seed counter such as `1,204`.
fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Parses human sizes like `1.4 GB`, `700MiB` or `1,024 KB` into bytes.
pub fn parse_size(text: &str) -> Option<i64> {
    let text = text.trim().replace(',', "");
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;
    let multiplier: f64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" | "BYTES" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TB" | "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier) as i64)
}

/// A search pattern for HTML result pages.
#[derive(Debug, Clone)]
pub struct SelectorPattern {
    source: String,
    config: SelectorPatternConfig,
    base: Option<Url>,
}

impl SelectorPattern {
    /// Validates every selector. `source` names the engine in each result.
    pub fn new(source: impl Into<String>, config: SelectorPatternConfig) -> Result<Self> {
        parse_selector(&config.item)?;
        parse_selector(&config.title)?;
        for css in [&config.link, &config.size, &config.seeds, &config.magnet] {
            optional_selector(css.as_deref())?;
        }
        let base = Url::parse(&config.url_template.replace(KEYWORDS_PLACEHOLDER, "")).ok();
        Ok(Self {
            source: source.into(),
            config,
            base,
        })
    }

    fn resolve(&self, href: &str) -> String {
        match &self.base {
            Some(base) => base
                .join(href)
                .map(String::from)
                .unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        }
    }
}

impl SearchPattern for SelectorPattern {
    fn build_request(&self, keywords: &str) -> Result<Request> {
        let encoded = urlencoding::encode(keywords);
        let url = self.config.url_template.replace(KEYWORDS_PLACEHOLDER, &encoded);
        let mut request = match &self.config.body_template {
            Some(body) => Request::post(
                url,
                body.replace(KEYWORDS_PLACEHOLDER, &encoded),
                self.config.content_type.as_str(),
            ),
            None => Request::get(url),
        };
        for (name, value) in &self.config.headers {
            request = request.with_header(name.as_str(), value.as_str());
        }
        Ok(request)
    }

    fn parse_response(&self, body: &str) -> Result<Vec<SearchResult>> {
        let document = Html::parse_document(body);
        let item = parse_selector(&self.config.item)?;
        let title = parse_selector(&self.config.title)?;
        let link = optional_selector(self.config.link.as_deref())?;
        let size = optional_selector(self.config.size.as_deref())?;
        let seeds = optional_selector(self.config.seeds.as_deref())?;
        let magnet = optional_selector(self.config.magnet.as_deref())?;

        let mut results = Vec::new();
        for element in document.select(&item) {
            let Some(title_elem) = element.select(&title).next() else {
                continue;
            };
            let name = text_of(title_elem);
            if name.is_empty() {
                continue;
            }

            let href = match &link {
                Some(_) => select_href(element, link.as_ref()),
                None => title_elem.value().attr("href").map(str::to_string),
            };
            let details_url = href.map(|h| self.resolve(&h)).unwrap_or_default();

            let mut result = SearchResult::new(name, &self.source).with_details_url(details_url.as_str());
            if let Some(bytes) = select_text(element, size.as_ref()).and_then(|s| parse_size(&s)) {
                result = result.with_size(bytes);
            }
            if let Some(magnet_url) = select_href(element, magnet.as_ref()) {
                let seed_count = select_text(element, seeds.as_ref())
                    .and_then(|s| parse_count(&s))
                    .unwrap_or(0);
                let mut torrent = TorrentMetadata::new(magnet_url, seed_count);
                if !details_url.is_empty() {
                    torrent.referrer_url = Some(details_url);
                }
                result = result.with_torrent(torrent);
            }
            if self.config.preliminary {
                result = result.preliminary();
            }
            results.push(result);
        }

        Ok(results)
    }
}

/// Selectors of a details page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorCrawlerConfig {
    /// Magnet link element; any `magnet:` anchor when absent.
    #[serde(default)]
    pub magnet: Option<String>,
    #[serde(default)]
    pub seeds: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Crawls a preliminary result's details page for its magnet link.
#[derive(Debug, Clone)]
pub struct SelectorCrawler {
    config: SelectorCrawlerConfig,
}

impl SelectorCrawler {
    pub fn new(config: SelectorCrawlerConfig) -> Result<Self> {
        optional_selector(Some(config.magnet.as_deref().unwrap_or(DEFAULT_MAGNET_SELECTOR)))?;
        for css in [&config.seeds, &config.size, &config.filename] {
            optional_selector(css.as_deref())?;
        }
        Ok(Self { config })
    }

    fn extract(&self, parent: &SearchResult, body: &str) -> Result<SearchResult> {
        let document = Html::parse_document(body);
        let root = document.root_element();
        let magnet = parse_selector(self.config.magnet.as_deref().unwrap_or(DEFAULT_MAGNET_SELECTOR))?;
        let seeds = optional_selector(self.config.seeds.as_deref())?;
        let size = optional_selector(self.config.size.as_deref())?;
        let filename = optional_selector(self.config.filename.as_deref())?;

        let magnet_url = select_href(root, Some(&magnet))
            .ok_or_else(|| SearchError::Parse(format!("No magnet link on {}", parent.details_url)))?;
        let seed_count = select_text(root, seeds.as_ref())
            .and_then(|s| parse_count(&s))
            .unwrap_or(0);
        let bytes = select_text(root, size.as_ref())
            .and_then(|s| parse_size(&s))
            .unwrap_or(parent.size);
        let name = select_text(root, filename.as_ref())
            .unwrap_or_else(|| format!("{}.torrent", parent.display_name));

        let mut torrent = TorrentMetadata::new(magnet_url, seed_count);
        torrent.referrer_url = Some(parent.details_url.clone());

        Ok(SearchResult::new(&parent.display_name, &parent.source)
            .with_filename(name)
            .with_size(bytes)
            .with_details_url(parent.details_url.as_str())
            .with_creation_time(parent.creation_time)
            .with_torrent(torrent))
    }
}

#[async_trait]
impl CrawlingStrategy for SelectorCrawler {
    async fn crawl(&self, fetcher: &dyn PageFetcher, result: &SearchResult) -> Result<Vec<SearchResult>> {
        if result.details_url.is_empty() {
            return Err(SearchError::Parse(format!(
                "{} has no details page to crawl",
                result.display_name
            )));
        }
        let body = fetcher.fetch(&Request::get(&result.details_url)).await?;
        Ok(vec![self.extract(result, &body)?])
    }
}

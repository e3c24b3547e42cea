//! Keyword suggestions: per-session histograms of recurring terms.
//!
//! Every result a session accepts feeds three histograms: the engine it
//! came from, its file extension and the words of its name. Terms that
//! recur often enough are offered as inclusive keyword filters.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::filter::KeywordFilter;
use crate::SearchResult;

static NON_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\p{L}. ]").expect("term regex is valid"));

/// Terms never counted (English, Spanish, Portuguese, French).
static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "an", "and", "are", "as", "at", "be", "by", "for", "with", "when", "where", "from", "has",
        "he", "in", "is", "it", "its", "of", "on", "we", "why", "your", "that", "the", "to",
        "this", "ft", "ft.", "feat", "feat.", "no", "me", "can", "cant", "not", "get", "into",
        "have", "had", "put", "you", "dont", "youre",
        // Spanish
        "son", "como", "en", "ser", "por", "dónde", "donde", "cuando", "el", "de", "tiene", "él",
        "es", "su", "nosotros", "qué", "que", "eso", "esa", "esto", "yo", "usted", "tu", "los",
        "para",
        // Portuguese
        "filho", "em", "quando", "nos", "tem", "ele", "seu", "nós", "quem", "isto", "voce",
        "você",
        // French
        "fils", "sous", "par", "où", "ou", "quand", "leur", "dans", "nous", "ce", "qui", "il",
        "le", "vous", "votre",
    ]
    .into_iter()
    .collect()
});

/// What a histogram counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SearchSource,
    FileExtension,
    FileName,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::SearchSource, Feature::FileExtension, Feature::FileName];

    /// Minimum share of `highest + total` counts a term needs to be suggested.
    pub fn filter_threshold(&self) -> f64 {
        match self {
            Self::SearchSource => 0.015,
            Self::FileExtension => 0.0,
            Self::FileName => 0.01,
        }
    }

    /// Accepted term lengths, in characters.
    pub fn token_length(&self) -> RangeInclusive<usize> {
        match self {
            Self::SearchSource => 4..=20,
            Self::FileExtension => 3..=8,
            Self::FileName => 3..=20,
        }
    }
}

/// Term counts per [`Feature`] for one session.
#[derive(Debug, Clone, Default)]
pub struct KeywordDetector {
    histograms: HashMap<Feature, HashMap<String, usize>>,
}

impl KeywordDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the consequential terms of `terms`: punctuation other than
    /// dots is dropped, and stopwords or terms outside the feature's length
    /// bounds are skipped.
    pub fn add_search_terms(&mut self, feature: Feature, terms: &str) {
        let cleaned = NON_TERM.replace_all(terms, "").to_lowercase();
        let lengths = feature.token_length();
        let histogram = self.histograms.entry(feature).or_default();
        for token in cleaned.split(' ') {
            if lengths.contains(&token.chars().count()) && !STOPWORDS.contains(token) {
                *histogram.entry(token.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Feeds the source, file extension and display name of a result.
    pub fn add_result(&mut self, result: &SearchResult) {
        self.add_search_terms(Feature::SearchSource, &result.source);
        if let Some(extension) = result.extension() {
            self.add_search_terms(Feature::FileExtension, &extension);
        }
        self.add_search_terms(Feature::FileName, &result.display_name);
    }

    /// Every counted term of `feature`, most frequent first, ties by term.
    pub fn histogram(&self, feature: Feature) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self
            .histograms
            .get(&feature)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    /// Terms seen more than once whose share clears the feature's threshold.
    pub fn suggestions(&self, feature: Feature) -> Vec<(String, usize)> {
        let histogram = self.histogram(feature);
        let total: usize = histogram.iter().map(|(_, count)| count).sum();
        let high = histogram.first().map_or(0, |(_, count)| *count);
        let threshold = feature.filter_threshold();
        histogram
            .into_iter()
            .filter(|(_, count)| *count > 1 && *count as f64 / (high + total) as f64 >= threshold)
            .collect()
    }

    /// Suggestions as inclusive filters, most frequent first.
    pub fn suggested_filters(&self, feature: Feature) -> Vec<KeywordFilter> {
        self.suggestions(feature)
            .iter()
            .map(|(term, _)| KeywordFilter::include(term))
            .collect()
    }

    pub fn total_keys(&self) -> usize {
        self.histograms.values().map(HashMap::len).sum()
    }

    pub fn reset(&mut self) {
        self.histograms.clear();
    }
}

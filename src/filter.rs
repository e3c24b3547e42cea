//! User-configurable keyword narrowing of result sets.
//!
//! Orthogonal to relevance ranking: a pipeline of inclusive/exclusive
//! substring filters that a result must pass in full.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::SearchResult;

static KEYWORD_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?P<sign>\+|-)?:keyword:(?P<keyword>[^\s-]*)")
        .expect("keyword directive regex is valid")
});

/// A single substring filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFilter {
    inclusive: bool,
    keyword: String,
}

impl KeywordFilter {
    pub fn new(inclusive: bool, keyword: &str) -> Self {
        Self {
            inclusive,
            keyword: keyword.to_lowercase(),
        }
    }

    pub fn include(keyword: &str) -> Self {
        Self::new(true, keyword)
    }

    pub fn exclude(keyword: &str) -> Self {
        Self::new(false, keyword)
    }

    pub fn is_inclusive(&self) -> bool {
        self.inclusive
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// `haystack` must already be lowercase.
    pub fn accept(&self, haystack: &str) -> bool {
        haystack.contains(&self.keyword) == self.inclusive
    }
}

/// Lowercased text a keyword filter is matched against.
pub fn haystack(result: &SearchResult) -> String {
    let mut text = String::with_capacity(128);
    text.push_str(&result.display_name);
    text.push(' ');
    text.push_str(&result.source);
    if let Some(filename) = &result.filename {
        text.push(' ');
        text.push_str(filename);
    }
    text.push(' ');
    text.push_str(&result.details_url);
    if let Some(thumbnail) = &result.thumbnail_url {
        text.push(' ');
        text.push_str(thumbnail);
    }
    if let Some(license) = &result.license {
        text.push(' ');
        text.push_str(license);
    }
    text.to_lowercase()
}

/// Ordered list of filters combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPipeline {
    filters: Vec<KeywordFilter>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<KeywordFilter>) -> Self {
        Self { filters }
    }

    /// Reads `+:keyword:x`, `-:keyword:x` and `:keyword:x` directives.
    pub fn parse(text: &str) -> Self {
        let filters = KEYWORD_DIRECTIVE
            .captures_iter(text)
            .filter_map(|caps| {
                let keyword = caps.name("keyword")?.as_str();
                if keyword.is_empty() {
                    return None;
                }
                let inclusive = caps.name("sign").map_or(true, |s| s.as_str() != "-");
                Some(KeywordFilter::new(inclusive, keyword))
            })
            .collect();
        Self { filters }
    }

    pub fn push(&mut self, filter: KeywordFilter) {
        self.filters.push(filter);
    }

    /// Removes every filter equal to `filter`, returning whether any was removed.
    pub fn remove(&mut self, filter: &KeywordFilter) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| f != filter);
        self.filters.len() != before
    }

    pub fn filters(&self) -> &[KeywordFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Short-circuits on the first rejecting filter.
    pub fn accept_haystack(&self, haystack: &str) -> bool {
        self.filters.iter().all(|f| f.accept(haystack))
    }

    pub fn accept(&self, result: &SearchResult) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        self.accept_haystack(&haystack(result))
    }
}

/// An unfiltered superset of items together with its filtered view.
#[derive(Debug, Clone)]
pub struct FilteredResults<T> {
    all: Vec<T>,
    visible: Vec<usize>,
    pipeline: FilterPipeline,
}

impl<T> Default for FilteredResults<T> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            visible: Vec::new(),
            pipeline: FilterPipeline::default(),
        }
    }
}

impl<T: AsRef<SearchResult>> FilteredResults<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item, returning true when it passes the current pipeline.
    pub fn push(&mut self, item: T) -> bool {
        let passes = self.pipeline.accept(item.as_ref());
        if passes {
            self.visible.push(self.all.len());
        }
        self.all.push(item);
        passes
    }

    /// Replaces the pipeline and re-filters the whole superset.
    pub fn set_pipeline(&mut self, pipeline: FilterPipeline) {
        self.pipeline = pipeline;
        self.refilter();
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    pub fn add_filter(&mut self, filter: KeywordFilter) {
        self.pipeline.push(filter);
        self.refilter();
    }

    pub fn remove_filter(&mut self, filter: &KeywordFilter) -> bool {
        let removed = self.pipeline.remove(filter);
        if removed {
            self.refilter();
        }
        removed
    }

    fn refilter(&mut self) {
        let pipeline = &self.pipeline;
        self.visible = self
            .all
            .iter()
            .enumerate()
            .filter(|(_, item)| pipeline.accept(item.as_ref()))
            .map(|(i, _)| i)
            .collect();
    }

    pub fn all(&self) -> &[T] {
        &self.all
    }

    pub fn all_mut(&mut self) -> &mut [T] {
        &mut self.all
    }

    pub fn visible(&self) -> impl Iterator<Item = &T> {
        self.visible.iter().map(|&i| &self.all[i])
    }

    /// Whether the item at `index` of the superset is in the filtered view.
    pub fn is_visible(&self, index: usize) -> bool {
        self.visible.binary_search(&index).is_ok()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

//! Relevance ranking of results against the session query.
//!
//! The relevance of a result blends how well its text matches the query
//! (edit distance and token coverage) with its popularity (seed count):
//!
//! ```text
//! keyword   = 0.7 * distance + 0.3 * coverage
//! seeds     = 1 - exp(-seeds / 50)
//! relevance = 0.8 * keyword + 0.2 * seeds
//! ```
//!
//! Every component is clamped to `[0, 1]`. The weights are configurable
//! through [`RankingWeights`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::text::{is_stopword, normalize_text, searchable_text, tokenize};
use crate::SearchResult;

/// Tunable weights of the relevance formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    /// Share of the keyword match in the final score.
    #[serde(default = "default_keyword")]
    pub keyword: f64,
    /// Share of popularity in the final score.
    #[serde(default = "default_seeds")]
    pub seeds: f64,
    /// Share of edit-distance similarity in the keyword score.
    #[serde(default = "default_distance")]
    pub distance: f64,
    /// Share of token coverage in the keyword score.
    #[serde(default = "default_token")]
    pub token: f64,
    /// Seed count at which popularity reaches ~63%.
    #[serde(default = "default_seed_decay")]
    pub seed_decay: f64,
}

fn default_keyword() -> f64 {
    0.8
}

fn default_seeds() -> f64 {
    0.2
}

fn default_distance() -> f64 {
    0.7
}

fn default_token() -> f64 {
    0.3
}

fn default_seed_decay() -> f64 {
    50.0
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            seeds: default_seeds(),
            distance: default_distance(),
            token: default_token(),
            seed_decay: default_seed_decay(),
        }
    }
}

/// Breakdown of a relevance computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingMetrics {
    pub token_coverage: f64,
    pub distance_score: f64,
    pub keyword_score: f64,
    pub seeds_score: f64,
    pub relevance: f64,
}

fn clamp(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Levenshtein edit distance over chars, using two rolling rows.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0usize; short.len() + 1];

    for (j, lc) in long.iter().enumerate() {
        curr[0] = j + 1;
        for (i, sc) in short.iter().enumerate() {
            let cost = usize::from(sc != lc);
            curr[i + 1] = (curr[i] + 1).min(prev[i + 1] + 1).min(prev[i] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// Number of tokens that occur in `text`.
pub fn count_matched_tokens(text: &str, tokens: &[String]) -> usize {
    if text.is_empty() {
        return 0;
    }
    tokens.iter().filter(|t| text.contains(t.as_str())).count()
}

/// Diminishing-returns popularity in `[0, 1)`.
pub fn seeds_score(seeds: u32, decay: f64) -> f64 {
    if seeds == 0 || decay <= 0.0 {
        return 0.0;
    }
    clamp(1.0 - (-(f64::from(seeds)) / decay).exp())
}

/// Scores one result against the query.
pub fn compute_ranking_metrics(
    query: &str,
    result: &SearchResult,
    weights: &RankingWeights,
) -> RankingMetrics {
    let result_text = searchable_text(result);
    let query_text = normalize_text(query);

    let tokens: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .collect();
    let matched = count_matched_tokens(&result_text, &tokens);
    let token_coverage = if tokens.is_empty() {
        if matched > 0 {
            1.0
        } else {
            0.0
        }
    } else {
        matched as f64 / tokens.len() as f64
    };

    let max_len = result_text.chars().count().max(query_text.chars().count());
    let distance_score = if max_len == 0 {
        1.0
    } else {
        let distance = levenshtein(&result_text, &query_text).min(max_len);
        clamp(1.0 - distance as f64 / max_len as f64)
    };

    let keyword_score = clamp(weights.distance * distance_score + weights.token * token_coverage);
    let seeds_score = seeds_score(result.seeds(), weights.seed_decay);
    let relevance = clamp(weights.keyword * keyword_score + weights.seeds * seeds_score);

    RankingMetrics {
        token_coverage,
        distance_score,
        keyword_score,
        seeds_score,
        relevance,
    }
}

/// A result prepared for presentation: display fields plus relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub result: SearchResult,
    /// The session query the relevance was computed against.
    pub query: String,
    /// Name of the registered engine the result came from.
    pub engine: String,
    pub extension: Option<String>,
    /// Seed count for display, empty for preliminary or unseeded results.
    pub seeds_label: String,
    pub metrics: RankingMetrics,
    weights: RankingWeights,
}

impl RankedResult {
    pub fn new(
        result: SearchResult,
        engine: impl Into<String>,
        query: impl Into<String>,
        weights: RankingWeights,
    ) -> Self {
        let mut ranked = Self {
            extension: result.extension(),
            result,
            query: query.into(),
            engine: engine.into(),
            seeds_label: String::new(),
            metrics: RankingMetrics::default(),
            weights,
        };
        ranked.update();
        ranked
    }

    /// Recomputes the volatile fields: seed label and relevance.
    pub fn update(&mut self) {
        let seeds = self.result.seeds();
        self.seeds_label = if seeds > 0 && !self.result.preliminary {
            seeds.to_string()
        } else {
            String::new()
        };
        self.metrics = compute_ranking_metrics(&self.query, &self.result, &self.weights);
    }

    /// Records a fresh seed count for torrent results and re-ranks.
    /// Returns false for results without torrent metadata.
    pub fn set_seeds(&mut self, seeds: u32) -> bool {
        match self.result.torrent.as_mut() {
            Some(torrent) => {
                torrent.seeds = seeds;
                self.update();
                true
            }
            None => false,
        }
    }

    pub fn relevance(&self) -> f64 {
        self.metrics.relevance
    }
}

impl AsRef<SearchResult> for RankedResult {
    fn as_ref(&self) -> &SearchResult {
        &self.result
    }
}

/// Sorts by descending relevance; ties keep their arrival order.
pub fn sort_by_relevance(results: &mut [RankedResult]) {
    results.sort_by(|a, b| {
        b.relevance()
            .partial_cmp(&a.relevance())
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TorrentMetadata;

    fn torrent(name: &str, seeds: u32) -> SearchResult {
        SearchResult::new(name, "TPB").with_torrent(TorrentMetadata::new("magnet:?xt=urn:btih:x", seeds))
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abcd"), 4);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("sitting", "kitten"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("niño", "nino"), 1);
    }

    #[test]
    fn test_count_matched_tokens() {
        let tokens = vec!["big".to_string(), "bunny".to_string(), "cat".to_string()];
        assert_eq!(count_matched_tokens("big buck bunny", &tokens), 2);
        assert_eq!(count_matched_tokens("", &tokens), 0);
    }

    #[test]
    fn test_seeds_score() {
        assert_eq!(seeds_score(0, 50.0), 0.0);
        let mut last = 0.0;
        for seeds in [1, 2, 10, 50, 120, 1000, 10_000] {
            let s = seeds_score(seeds, 50.0);
            assert!(s > last, "seeds {seeds} -> {s} not above {last}");
            assert!(s <= 1.0);
            last = s;
        }
        assert!((seeds_score(50, 50.0) - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_exact_match_is_maximal() {
        let weights = RankingWeights::default();
        let metrics = compute_ranking_metrics("Big Buck Bunny", &SearchResult::new("big buck bunny", "A"), &weights);
        assert_eq!(metrics.distance_score, 1.0);
        assert_eq!(metrics.token_coverage, 1.0);
        assert!((metrics.keyword_score - 1.0).abs() < 1e-12);
        assert_eq!(metrics.seeds_score, 0.0);
        assert!((metrics.relevance - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_stopwords_do_not_count() {
        let weights = RankingWeights::default();
        let metrics = compute_ranking_metrics("the bunny", &SearchResult::new("bunny", "A"), &weights);
        assert_eq!(metrics.token_coverage, 1.0);
    }

    #[test]
    fn test_accented_stopwords_do_not_count() {
        let weights = RankingWeights::default();
        let bunny = SearchResult::new("bunny", "A");
        for query in ["über bunny", "für bunny", "más bunny"] {
            let metrics = compute_ranking_metrics(query, &bunny, &weights);
            assert_eq!(metrics.token_coverage, 1.0, "query: {query}");
        }
    }

    #[test]
    fn test_no_match() {
        let weights = RankingWeights::default();
        let metrics = compute_ranking_metrics("zzzz", &SearchResult::new("abc", "A"), &weights);
        assert_eq!(metrics.token_coverage, 0.0);
        assert_eq!(metrics.distance_score, 0.0);
        assert_eq!(metrics.relevance, 0.0);
    }

    #[test]
    fn test_both_empty() {
        let weights = RankingWeights::default();
        let metrics = compute_ranking_metrics("", &SearchResult::new("", "A"), &weights);
        assert_eq!(metrics.distance_score, 1.0);
        assert_eq!(metrics.token_coverage, 0.0);
        assert!((metrics.keyword_score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_scores_are_bounded() {
        let weights = RankingWeights::default();
        let queries = ["", "a", "big buck bunny", "the and of", "ÜBER café"];
        let results = [
            torrent("", 0),
            torrent("Big Buck Bunny 1080p", 120),
            torrent("completely unrelated title with many words", u32::MAX),
            SearchResult::new("über cafe", "A").with_filename("über_café.mp3"),
        ];
        for q in queries {
            for r in &results {
                let m = compute_ranking_metrics(q, r, &weights);
                for v in [m.token_coverage, m.distance_score, m.keyword_score, m.seeds_score, m.relevance] {
                    assert!((0.0..=1.0).contains(&v), "{q:?} vs {:?}: {m:?}", r.display_name);
                }
            }
        }
    }

    #[test]
    fn test_seeds_boost_relevance() {
        let weights = RankingWeights::default();
        let seeded = RankedResult::new(torrent("Big Buck Bunny 1080p", 120), "TPB", "big buck bunny", weights);
        let unseeded = RankedResult::new(torrent("Big Buck Bunny 1080p", 0), "TPB", "big buck bunny", weights);
        assert!(seeded.relevance() > unseeded.relevance());
        assert_eq!(seeded.seeds_label, "120");
        assert_eq!(unseeded.seeds_label, "");
    }

    #[test]
    fn test_preliminary_hides_seeds() {
        let ranked = RankedResult::new(
            torrent("Bunny", 10).preliminary(),
            "1337x",
            "bunny",
            RankingWeights::default(),
        );
        assert_eq!(ranked.seeds_label, "");
        assert!(ranked.metrics.seeds_score > 0.0);
    }

    #[test]
    fn test_set_seeds_recomputes_volatile_fields() {
        let mut ranked = RankedResult::new(torrent("Bunny", 0), "TPB", "bunny", RankingWeights::default());
        let before = ranked.relevance();
        assert!(ranked.set_seeds(300));
        assert_eq!(ranked.seeds_label, "300");
        assert!(ranked.relevance() > before);

        let mut plain = RankedResult::new(SearchResult::new("Bunny", "A"), "A", "bunny", RankingWeights::default());
        assert!(!plain.set_seeds(5));
    }

    #[test]
    fn test_custom_weights() {
        let weights = RankingWeights {
            keyword: 0.0,
            seeds: 1.0,
            ..Default::default()
        };
        let ranked = RankedResult::new(torrent("x", 50), "TPB", "y", weights);
        assert!((ranked.relevance() - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_sort_by_relevance() {
        let weights = RankingWeights::default();
        let mut results = vec![
            RankedResult::new(SearchResult::new("unrelated", "A"), "A", "big buck bunny", weights),
            RankedResult::new(torrent("Big Buck Bunny", 500), "TPB", "big buck bunny", weights),
            RankedResult::new(SearchResult::new("Big Buck Bunny", "A"), "A", "big buck bunny", weights),
        ];
        sort_by_relevance(&mut results);
        assert_eq!(results[0].result.source, "TPB");
        assert_eq!(results[2].result.display_name, "unrelated");
    }

    #[test]
    fn test_weights_deserialize_defaults() {
        let weights: RankingWeights = serde_json::from_str(r#"{"seeds": 0.5}"#).unwrap();
        assert_eq!(weights.seeds, 0.5);
        assert_eq!(weights.keyword, 0.8);
        assert_eq!(weights.seed_decay, 50.0);
    }
}

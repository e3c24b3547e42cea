//! Text normalization shared by token filtering and relevance scoring.
//!
//! Every string that is compared against query tokens goes through
//! [`normalize_text`]: compatibility decomposition with diacritics removed,
//! HTML tags and entities stripped, noise characters and domain-like
//! fragments replaced by spaces, whitespace collapsed and lowercased.
//! The output is a fixpoint: normalizing it again yields the same string.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::SearchResult;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<.*?>").expect("tag regex is valid"));

static HTML_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#?[a-zA-Z0-9]+;").expect("entity regex is valid"));

static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.torrent|www\.|\.com|\.net|[\\/%_;\-.()\[\]\n\rÐ&~{}*@^'=!,¡|#ÀÁ]")
        .expect("noise regex is valid")
});

/// Words ignored when measuring token coverage (English, Spanish, German),
/// stored accent-folded like query tokens.
pub static STOPWORDS: LazyLock<HashSet<String>> = LazyLock::new(|| {
    [
        // English
        "and", "the", "a", "on", "in", "of", "for", "to", "is", "it", "at", "by", "an", "or",
        "as", "be", "with", "this", "that", "these", "those", "from", "but", "about", "which",
        "some", "so", "out", "then", "than", "too",
        // Spanish
        "y", "el", "la", "los", "las", "un", "una", "unos", "unas", "en", "de", "para", "por",
        "con", "como", "sobre", "al", "lo", "es", "del", "más", "ya", "o", "sin", "sus", "le",
        "se", "me", "te", "tu", "mi", "esto", "eso", "estos", "esos", "aquel", "aquella",
        "aquellos", "aquellas",
        // German
        "und", "der", "die", "ein", "eine", "einer", "einem", "einen", "im", "auf", "am", "zu",
        "mit", "von", "über", "für", "ist", "war", "sein", "sie", "er", "wir", "ihr", "denn",
        "doch", "nicht", "weil", "als", "aber", "wenn", "dann", "dies", "diese", "dieser",
        "dieses", "das", "jenes", "solche",
    ]
    .into_iter()
    .map(fold_diacritics)
    .collect()
});

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(fold_diacritics(token).to_lowercase().as_str())
}

/// Removes HTML tags and character entities.
pub fn strip_html(s: &str) -> String {
    let without_tags = HTML_TAG.replace_all(s, "");
    HTML_ENTITY.replace_all(&without_tags, "").into_owned()
}

/// Strips markup and noise characters, collapsing runs of whitespace.
pub fn sanitize(s: &str) -> String {
    let stripped = strip_html(s);
    let denoised = NOISE.replace_all(&stripped, " ");
    denoised.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// NFKD decomposition without combining diacritical marks (U+0300..U+036F).
pub fn fold_diacritics(s: &str) -> String {
    s.nfkd()
        .filter(|c| !('\u{0300}'..='\u{036F}').contains(c))
        .collect()
}

/// Canonical comparable form of arbitrary text.
pub fn normalize_text(s: &str) -> String {
    sanitize(&fold_diacritics(s)).to_lowercase()
}

/// Splits a query into its canonical token set, in first-seen order.
pub fn tokenize(keywords: &str) -> Vec<String> {
    let normalized = normalize_text(keywords);
    let mut seen = HashSet::new();
    normalized
        .split(' ')
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

/// Normalized text of the fields a result is matched on: display name,
/// the crawl parent's display name and the file name.
pub fn searchable_text(result: &SearchResult) -> String {
    let mut text = result.display_name.clone();
    if let Some(parent) = &result.crawled_from {
        text.push(' ');
        text.push_str(parent);
    }
    if let Some(filename) = &result.filename {
        text.push(' ');
        text.push_str(filename);
    }
    normalize_text(&text)
}

/// True when every token occurs in the result's searchable text.
pub fn matches_all_tokens(result: &SearchResult, tokens: &[String]) -> bool {
    let haystack = searchable_text(result);
    tokens.iter().all(|t| haystack.contains(t.as_str()))
}

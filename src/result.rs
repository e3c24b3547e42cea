//! Search result types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

static MAGNET_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"magnet:\?xt=urn:btih:([a-fA-F0-9]{40})").expect("magnet regex is valid")
});

static NEXT_TOKEN: LazyLock<AtomicU64> = LazyLock::new(|| {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1);
    AtomicU64::new(seed & (i64::MAX as u64))
});

/// Opaque identifier of one search session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchToken(u64);

impl SearchToken {
    /// Returns a token never handed out before by this process.
    pub fn generate() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SearchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability-derived kind of a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Downloadable through a torrent or magnet link.
    Torrent,
    /// Playable through a stream URL.
    Stream,
    /// A named file with a direct download.
    File,
    /// A page with no file metadata.
    #[default]
    Web,
}

/// Torrent metadata attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    /// `.torrent` URL or magnet URI.
    pub torrent_url: String,
    /// Lowercase hex info-hash, when known.
    pub info_hash: Option<String>,
    /// Live seed count reported by the engine.
    pub seeds: u32,
    /// Page the torrent was found on.
    pub referrer_url: Option<String>,
}

impl TorrentMetadata {
    /// Creates torrent metadata, deriving the info-hash from magnet URIs.
    pub fn new(torrent_url: impl Into<String>, seeds: u32) -> Self {
        let torrent_url = torrent_url.into();
        let info_hash = parse_info_hash(&torrent_url);
        Self {
            torrent_url,
            info_hash,
            seeds,
            referrer_url: None,
        }
    }
}

/// Streaming capability attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingMetadata {
    pub stream_url: String,
}

/// A single search hit.
///
/// One flat shape for every engine: torrent, streaming and crawl ancestry are
/// optional capabilities rather than subtypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Human readable title.
    pub display_name: String,
    /// File name, for file-typed results.
    pub filename: Option<String>,
    /// Size in bytes, -1 when unknown.
    pub size: i64,
    /// Name of the engine that produced this result.
    pub source: String,
    /// Page describing the result.
    pub details_url: String,
    /// Thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// Creation time in epoch milliseconds, 0 when unknown.
    pub creation_time: i64,
    /// License name, None when unknown.
    pub license: Option<String>,
    /// Needs a crawl before it is downloadable.
    pub preliminary: bool,
    /// View count, for streaming sources.
    pub view_count: Option<u64>,
    pub torrent: Option<TorrentMetadata>,
    pub streaming: Option<StreamingMetadata>,
    /// Display name of the preliminary result this one was crawled from.
    pub crawled_from: Option<String>,
}

impl SearchResult {
    /// Creates a new search result.
    pub fn new(display_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            filename: None,
            size: -1,
            source: source.into(),
            details_url: String::new(),
            thumbnail_url: None,
            creation_time: 0,
            license: None,
            preliminary: false,
            view_count: None,
            torrent: None,
            streaming: None,
            crawled_from: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn with_details_url(mut self, url: impl Into<String>) -> Self {
        self.details_url = url.into();
        self
    }

    /// Sets the thumbnail URL.
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail.into());
        self
    }

    pub fn with_creation_time(mut self, epoch_ms: i64) -> Self {
        self.creation_time = epoch_ms;
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn with_view_count(mut self, views: u64) -> Self {
        self.view_count = Some(views);
        self
    }

    pub fn with_torrent(mut self, torrent: TorrentMetadata) -> Self {
        self.torrent = Some(torrent);
        self
    }

    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.streaming = Some(StreamingMetadata {
            stream_url: url.into(),
        });
        self
    }

    /// Marks the result as needing a crawl.
    pub fn preliminary(mut self) -> Self {
        self.preliminary = true;
        self
    }

    /// Records the preliminary result this one was resolved from.
    pub fn crawled_from(mut self, parent: &SearchResult) -> Self {
        self.crawled_from = Some(parent.display_name.clone());
        self
    }

    pub fn as_torrent(&self) -> Option<&TorrentMetadata> {
        self.torrent.as_ref()
    }

    pub fn as_streamable(&self) -> Option<&StreamingMetadata> {
        self.streaming.as_ref()
    }

    pub fn is_crawled(&self) -> bool {
        self.crawled_from.is_some()
    }

    /// Seed count, 0 for non-torrent results.
    pub fn seeds(&self) -> u32 {
        self.torrent.as_ref().map_or(0, |t| t.seeds)
    }

    /// Lowercase extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        let filename = self.filename.as_deref()?;
        let (stem, ext) = filename.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() || ext.contains('/') {
            return None;
        }
        Some(ext.to_lowercase())
    }

    pub fn kind(&self) -> ResultKind {
        if self.torrent.is_some() {
            ResultKind::Torrent
        } else if self.streaming.is_some() {
            ResultKind::Stream
        } else if self.filename.is_some() {
            ResultKind::File
        } else {
            ResultKind::Web
        }
    }
}

impl AsRef<SearchResult> for SearchResult {
    fn as_ref(&self) -> &SearchResult {
        self
    }
}

/// Extracts the lowercase btih info-hash from a magnet URI.
pub fn parse_info_hash(url: &str) -> Option<String> {
    MAGNET_HASH
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

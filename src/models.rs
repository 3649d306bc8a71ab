//! Data models shared by the cache, the collectors and the orchestrator.
//!
//! - [`ContentId`]: source-namespaced identifier used for deduplication
//! - [`CollectedItem`]: one accepted item with its ranking signals
//! - [`ItemDetail`]: the per-source part of an item
//! - [`CollectorResult`]: what one collector invocation hands back

use crate::collectors::CollectError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one piece of content from one source.
///
/// Always built as `"{namespace}_{native_id}"` so identical native ids from
/// different sources never collide, and re-fetching the same item yields the
/// same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(namespace: &str, native_id: impl fmt::Display) -> Self {
        Self(format!("{namespace}_{native_id}"))
    }

    /// Wrap an identifier read back from the persisted cache file.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A collected item as handed from a collector to the orchestrator.
///
/// The common fields are what ranking and rendering rely on; everything that
/// only one family of sources knows about lives in [`ItemDetail`].
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedItem {
    pub id: ContentId,
    /// Display name of the source (or sub-source, e.g. a gallery name).
    pub source: String,
    pub title: String,
    pub url: String,
    /// Popularity metric used for ordering (score, stars today, downloads, views).
    pub rank_signal: i64,
    /// Second metric shown next to the rank (usually comment count).
    pub secondary_signal: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub detail: ItemDetail,
}

/// Source-specific part of a [`CollectedItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDetail {
    /// Link aggregators: Hacker News, Lobsters, DEV.to, Reddit.
    Story {
        author: String,
        tags: Vec<String>,
        excerpt: Option<String>,
    },
    /// GitHub trending repository.
    Repository {
        language: String,
        description: String,
        stars_today: i64,
        forks: i64,
    },
    /// Hugging Face model.
    Model {
        pipeline_tag: String,
        tags: Vec<String>,
        recent: bool,
    },
    /// Community board post.
    Post { board: String, votes: i64 },
    /// RSS/Atom entry.
    FeedEntry {
        feed: String,
        category: String,
        summary: String,
    },
    /// 5ch thread.
    Thread { board: String },
}

/// The ordered output of one `collect` call.
///
/// `failure` is set when the whole source could not be fetched; `items` is
/// then empty. A result with items and no failure may still come from a
/// source where some sub-feeds failed.
#[derive(Debug, Default)]
pub struct CollectorResult {
    pub items: Vec<CollectedItem>,
    pub failure: Option<CollectError>,
}

impl CollectorResult {
    pub fn ok(items: Vec<CollectedItem>) -> Self {
        Self {
            items,
            failure: None,
        }
    }

    pub fn failed(error: CollectError) -> Self {
        Self {
            items: Vec::new(),
            failure: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_item(namespace: &str, native: &str, rank: i64) -> CollectedItem {
    CollectedItem {
        id: ContentId::new(namespace, native),
        source: namespace.to_string(),
        title: format!("Item {native}"),
        url: format!("https://example.com/{native}"),
        rank_signal: rank,
        secondary_signal: 0,
        timestamp: None,
        detail: ItemDetail::Story {
            author: "tester".to_string(),
            tags: vec![],
            excerpt: None,
        },
    }
}

//! Source collectors.
//!
//! Every source, whether a JSON API, a feed or a scraped listing page, sits
//! behind the [`Collector`] trait so the orchestrator can hold one
//! homogeneous list of them.
//!
//! # Shared Contract
//!
//! - `collect(limit)` over-fetches (`OVERFETCH_FACTOR × limit` raw items),
//!   because part of every listing has been reported before.
//! - Candidates already in the [`SeenCache`] are skipped while fetching,
//!   but nothing is marked until the merged result is capped to what
//!   `format_for_analysis` renders. [`CollectorContext::claim`] then marks
//!   exactly the returned items, so every claimed id reaches the report and
//!   an item dropped by the cap is offered again next run.
//! - A malformed item is skipped (item parsers return `Option`).
//! - A failed source yields [`CollectorResult::failed`]; nothing is raised.
//! - Sub-feeds of one source are combined with [`merge_ranked`].
//!
//! # Supported Sources
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Hacker News | [`hackernews`] | Firebase JSON API |
//! | Lobsters | [`lobsters`] | JSON listings |
//! | DEV.to | [`devto`] | JSON API |
//! | Hugging Face | [`huggingface`] | JSON API |
//! | Reddit | [`reddit`] | Public listing JSON |
//! | RSS/Atom | [`rss`] | XML feeds |
//! | GitHub Trending | [`github_trending`] | HTML scraping |
//! | DCInside, Clien, FMKorea, Ruliweb, Ppomppu | [`boards`] | HTML scraping |
//! | 5ch | [`fivech`] | HTML scraping |

pub mod boards;
pub mod devto;
pub mod fivech;
pub mod format;
pub mod github_trending;
pub mod hackernews;
pub mod huggingface;
pub mod lobsters;
pub mod reddit;
pub mod rss;

use crate::cache::SeenCache;
use crate::fetch::{Fetch, FetchError};
use crate::models::{CollectedItem, CollectorResult};
use async_trait::async_trait;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Raw items requested per wanted new item.
pub const OVERFETCH_FACTOR: usize = 2;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{feed}: undecodable response: {message}")]
    Decode { feed: String, message: String },

    #[error("invalid selector {0}")]
    Selector(String),

    #[error("invalid url {0}")]
    Url(String),
}

/// A content source.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name used in logs, tallies and the "no new items" sentinel.
    fn name(&self) -> &str;

    /// Gather up to `limit` items that were not reported before.
    async fn collect(&self, limit: usize) -> CollectorResult;

    /// Render a result as a numbered text block for the analysis stage.
    fn format_for_analysis(&self, result: &CollectorResult) -> String;
}

/// What every collector is constructed with.
#[derive(Clone)]
pub struct CollectorContext {
    pub cache: Arc<SeenCache>,
    pub fetch: Arc<dyn Fetch>,
    browser_user_agent: Option<String>,
}

impl CollectorContext {
    pub fn new(cache: Arc<SeenCache>, fetch: Arc<dyn Fetch>) -> Self {
        Self {
            cache,
            fetch,
            browser_user_agent: None,
        }
    }

    /// User agent sent by scraping collectors to sites that reject bots.
    pub fn with_browser_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.browser_user_agent = Some(user_agent.into()).filter(|ua: &String| !ua.is_empty());
        self
    }

    /// Headers for HTML page requests.
    pub fn page_headers(&self) -> Vec<(&str, &str)> {
        let mut headers = vec![("Accept", "text/html,application/xhtml+xml")];
        if let Some(ua) = &self.browser_user_agent {
            headers.push(("User-Agent", ua.as_str()));
        }
        headers
    }

    /// Fetch `url` and decode it as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        feed: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, CollectError> {
        let body = self.fetch.get_text(url, headers).await?;
        serde_json::from_str(&body).map_err(|e| CollectError::Decode {
            feed: feed.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, CollectError> {
        Ok(self.fetch.get_text(url, headers).await?)
    }

    /// Take parsed candidates in order until `limit` unseen ones are found.
    ///
    /// `None` candidates (items that failed to parse) and repeats within the
    /// call are skipped. Nothing is marked seen here; see [`Self::claim`].
    /// The iterator is consumed lazily, so nothing past the limit is parsed.
    pub fn take_unseen<I>(&self, candidates: I, limit: usize) -> Vec<CollectedItem>
    where
        I: IntoIterator<Item = Option<CollectedItem>>,
    {
        let mut taken = Vec::new();
        if limit == 0 {
            return taken;
        }
        let mut ids = HashSet::new();
        for item in candidates.into_iter().flatten() {
            if self.cache.is_seen(&item.id) || !ids.insert(item.id.clone()) {
                continue;
            }
            taken.push(item);
            if taken.len() >= limit {
                break;
            }
        }
        taken
    }

    /// Mark the final items of a run as seen.
    ///
    /// Items another collector claimed in the meantime are dropped, so an id
    /// is reported by at most one source per run.
    pub fn claim(&self, mut result: CollectorResult) -> CollectorResult {
        result.items.retain(|item| self.cache.claim(&item.id));
        result
    }
}

/// Combine the sub-feeds of one source.
///
/// Items are concatenated in sub-feed order, later duplicates (by id) are
/// dropped, the rest is sorted by `rank_signal` descending (stable, so ties
/// keep arrival order) and truncated to `cap`. The result only counts as
/// failed when every sub-feed failed.
pub fn merge_ranked(
    source: &str,
    feeds: Vec<Result<Vec<CollectedItem>, CollectError>>,
    cap: usize,
) -> CollectorResult {
    let total = feeds.len();
    let mut failures = 0usize;
    let mut first_error = None;
    let mut combined = Vec::new();

    for feed in feeds {
        match feed {
            Ok(items) => combined.extend(items),
            Err(e) => {
                failures += 1;
                warn!(source, error = %e, "Sub-feed failed");
                first_error.get_or_insert(e);
            }
        }
    }

    if failures == total {
        if let Some(error) = first_error {
            return CollectorResult::failed(error);
        }
    }

    let mut merged: Vec<CollectedItem> = combined
        .into_iter()
        .unique_by(|item| item.id.clone())
        .collect();
    merged.sort_by(|a, b| b.rank_signal.cmp(&a.rank_signal));
    merged.truncate(cap);
    CollectorResult::ok(merged)
}

/// Single-feed sources: an error becomes a failed result.
pub fn single_feed(result: Result<Vec<CollectedItem>, CollectError>) -> CollectorResult {
    match result {
        Ok(items) => CollectorResult::ok(items),
        Err(e) => CollectorResult::failed(e),
    }
}

//! Hacker News collector.
//!
//! Uses the public Firebase API: `topstories.json` / `beststories.json` give
//! ordered id lists, `item/{id}.json` gives each story. Items are fetched
//! concurrently (at most [`ITEM_CONCURRENCY`] in flight) but consumed in list
//! order, and fetching stops as soon as enough new stories are found.

use super::format::{Entry, render_section, sentinel};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::HackerNewsSettings;
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use async_trait::async_trait;
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

const NAME: &str = "Hacker News";
const NAMESPACE: &str = "hn";
const ITEM_CONCURRENCY: usize = 10;
const DISPLAY_LIMIT: usize = 30;

#[derive(Debug, Deserialize)]
struct HnItem {
    id: u64,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    title: String,
    url: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    descendants: i64,
    #[serde(default)]
    by: String,
    #[serde(default)]
    time: i64,
}

/// Top and best stories, merged and ranked by score.
pub struct HackerNewsCollector {
    ctx: CollectorContext,
    base_url: String,
    best_limit: usize,
}

impl HackerNewsCollector {
    pub fn new(ctx: CollectorContext, settings: &HackerNewsSettings) -> Self {
        Self {
            ctx,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            best_limit: settings.best_stories,
        }
    }

    #[instrument(level = "info", skip(self))]
    async fn collect_feed(&self, endpoint: &str, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/{endpoint}.json", self.base_url);
        let ids: Vec<u64> = self.ctx.get_json(NAME, &url, &[]).await?;

        let fresh: Vec<u64> = ids
            .into_iter()
            .take(limit * OVERFETCH_FACTOR)
            .unique()
            .filter(|id| !self.ctx.cache.is_seen(&ContentId::new(NAMESPACE, id)))
            .collect();

        let mut items = stream::iter(fresh)
            .map(|id| self.fetch_item(id))
            .buffered(ITEM_CONCURRENCY);

        let mut found = Vec::new();
        while let Some(candidate) = items.next().await {
            let Some(item) = candidate else { continue };
            found.push(item);
            if found.len() >= limit {
                break;
            }
        }

        info!(count = found.len(), "Collected Hacker News stories");
        Ok(found)
    }

    async fn fetch_item(&self, id: u64) -> Option<CollectedItem> {
        let url = format!("{}/item/{id}.json", self.base_url);
        match self.ctx.get_json::<Value>(NAME, &url, &[]).await {
            Ok(raw) => parse_item(raw),
            Err(e) => {
                debug!(id, error = %e, "Skipping Hacker News item");
                None
            }
        }
    }
}

/// Stories only; deleted items (`null`), jobs and polls are skipped.
fn parse_item(raw: Value) -> Option<CollectedItem> {
    let item: HnItem = serde_json::from_value(raw).ok()?;
    if item.kind != "story" {
        return None;
    }

    let url = item
        .url
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", item.id));

    Some(CollectedItem {
        id: ContentId::new(NAMESPACE, item.id),
        source: NAME.to_string(),
        title: item.title,
        url,
        rank_signal: item.score,
        secondary_signal: item.descendants,
        timestamp: DateTime::from_timestamp(item.time, 0),
        detail: ItemDetail::Story {
            author: if item.by.is_empty() { "unknown".to_string() } else { item.by },
            tags: Vec::new(),
            excerpt: None,
        },
    })
}

#[async_trait]
impl Collector for HackerNewsCollector {
    fn name(&self) -> &str {
        NAME
    }

    async fn collect(&self, limit: usize) -> CollectorResult {
        let top = self.collect_feed("topstories", limit).await;
        let best = self.collect_feed("beststories", self.best_limit).await;
        let cap = (limit + self.best_limit).min(DISPLAY_LIMIT);
        self.ctx.claim(merge_ranked(NAME, vec![top, best], cap))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }
        render_section(NAME, &result.items, |item| {
            Entry::new(
                item.title.clone(),
                format!("Score: {} | Comments: {}", item.rank_signal, item.secondary_signal),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CleanupPolicy, SeenCache};
    use crate::collectors::test_support::{assert_seen_matches_rendered, context, empty_cache};
    use crate::fetch::testing::{FailingFetcher, StubFetcher};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    const BASE: &str = "https://hn.test/v0";

    fn story(id: u64, score: i64) -> String {
        format!(
            r#"{{"id": {id}, "type": "story", "title": "Story {id}", "url": "https://example.com/{id}", "score": {score}, "descendants": {comments}, "by": "pg", "time": 1700000000}}"#,
            comments = id * 2
        )
    }

    fn settings(best: usize) -> HackerNewsSettings {
        HackerNewsSettings {
            base_url: BASE.to_string(),
            best_stories: best,
            ..HackerNewsSettings::default()
        }
    }

    fn stub() -> StubFetcher {
        StubFetcher::new()
            .with(&format!("{BASE}/topstories.json"), "[1, 2, 2, 3, 4]")
            .with(&format!("{BASE}/beststories.json"), "[3, 5, 6]")
            .with(&format!("{BASE}/item/1.json"), story(1, 10))
            .with(&format!("{BASE}/item/2.json"), story(2, 300))
            .with(&format!("{BASE}/item/3.json"), story(3, 50))
            .with(
                &format!("{BASE}/item/4.json"),
                r#"{"id": 4, "type": "job", "title": "Hiring", "score": 1}"#,
            )
            .with(&format!("{BASE}/item/5.json"), "null")
            .with(&format!("{BASE}/item/6.json"), story(6, 80))
    }

    #[tokio::test]
    async fn test_collect_merges_and_ranks() {
        let collector = HackerNewsCollector::new(context(stub()), &settings(10));
        let result = collector.collect(10).await;

        assert!(!result.is_failed());
        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["hn_2", "hn_6", "hn_3", "hn_1"]);
        assert_eq!(result.items[0].secondary_signal, 4);
    }

    #[tokio::test]
    async fn test_pagination_overlap_is_delivered_once() {
        let collector = HackerNewsCollector::new(context(stub()), &settings(0));
        let result = collector.collect(10).await;
        let twos = result.items.iter().filter(|i| i.id.as_str() == "hn_2").count();
        assert_eq!(twos, 1);
    }

    #[tokio::test]
    async fn test_collect_stops_at_limit() {
        let collector = HackerNewsCollector::new(context(stub()), &settings(0));
        let result = collector.collect(1).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result.items[0].id.as_str(), "hn_1");
    }

    #[tokio::test]
    async fn test_second_collect_in_same_run_returns_nothing_new() {
        let collector = HackerNewsCollector::new(context(stub()), &settings(10));
        assert!(!collector.collect(10).await.is_empty());
        let again = collector.collect(10).await;
        assert!(again.is_empty());
        assert!(!again.is_failed());
    }

    #[tokio::test]
    async fn test_seen_ids_are_not_fetched() {
        let fetch = Arc::new(stub());
        let cache = empty_cache();
        cache.mark_seen(ContentId::new(NAMESPACE, 2));
        let collector =
            HackerNewsCollector::new(CollectorContext::new(cache, fetch.clone()), &settings(0));

        let result = collector.collect(10).await;
        assert!(result.items.iter().all(|i| i.id.as_str() != "hn_2"));
        assert!(!fetch.requests().iter().any(|u| u.ends_with("/item/2.json")));
    }

    #[tokio::test]
    async fn test_cross_run_suppression() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seen_content.json");

        let first_cache = Arc::new(SeenCache::load(&path, CleanupPolicy::default()).await);
        let first = HackerNewsCollector::new(
            CollectorContext::new(first_cache.clone(), Arc::new(stub())),
            &settings(0),
        );
        let run1 = first.collect(10).await;
        assert!(run1.items.iter().any(|i| i.id.as_str() == "hn_2"));
        first_cache.persist().await.unwrap();

        let second_cache = Arc::new(SeenCache::load(&path, CleanupPolicy::default()).await);
        let second = HackerNewsCollector::new(
            CollectorContext::new(second_cache, Arc::new(stub())),
            &settings(0),
        );
        let run2 = second.collect(10).await;
        assert!(run2.items.iter().all(|i| i.id.as_str() != "hn_2"));
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_failed_empty_result() {
        let collector = HackerNewsCollector::new(context(FailingFetcher), &settings(10));
        let result = collector.collect(10).await;
        assert!(result.is_failed());
        assert!(result.is_empty());
        assert_eq!(collector.format_for_analysis(&result), sentinel(NAME));
    }

    #[tokio::test]
    async fn test_ask_hn_without_url_links_to_discussion() {
        let fetch = StubFetcher::new()
            .with(&format!("{BASE}/topstories.json"), "[9]")
            .with(
                &format!("{BASE}/item/9.json"),
                r#"{"id": 9, "type": "story", "title": "Ask HN: Rust?", "score": 5}"#,
            );
        let collector = HackerNewsCollector::new(context(fetch), &settings(0));
        let result = collector.collect(5).await;
        assert_eq!(result.items[0].url, "https://news.ycombinator.com/item?id=9");
    }

    #[tokio::test]
    async fn test_format_for_analysis() {
        let collector = HackerNewsCollector::new(context(stub()), &settings(0));
        let result = collector.collect(2).await;
        let text = collector.format_for_analysis(&result);
        assert!(text.contains("## Hacker News"));
        assert!(text.contains("1. Story 2\n   Score: 300 | Comments: 4\n   URL: https://example.com/2\n"));
    }

    #[tokio::test]
    async fn test_overflowing_front_page_claims_only_rendered_stories() {
        let ids: Vec<u64> = (1..=40).collect();
        let mut fetch = StubFetcher::new().with(&format!("{BASE}/topstories.json"), format!("{ids:?}"));
        for id in &ids {
            fetch = fetch.with(&format!("{BASE}/item/{id}.json"), story(*id, *id as i64));
        }
        let ctx = context(fetch);
        let cache = ctx.cache.clone();
        let collector = HackerNewsCollector::new(ctx, &settings(0));

        let result = collector.collect(40).await;
        assert_eq!(result.len(), DISPLAY_LIMIT);
        let text = collector.format_for_analysis(&result);
        assert_seen_matches_rendered(&cache, &result, &text);
        // the lowest-scored stories fell off the cap and stay unseen
        assert!(!cache.is_seen(&ContentId::new(NAMESPACE, 1)));
    }

    #[tokio::test]
    async fn test_slow_items_keep_list_order() {
        let fetch = StubFetcher::new()
            .with(&format!("{BASE}/topstories.json"), "[1, 2, 3]")
            .with_delay(&format!("{BASE}/item/1.json"), story(1, 5), Duration::from_millis(60))
            .with_delay(&format!("{BASE}/item/2.json"), story(2, 5), Duration::from_millis(30))
            .with(&format!("{BASE}/item/3.json"), story(3, 5));
        let collector = HackerNewsCollector::new(context(fetch), &settings(0));

        // equal scores, so the stable merge shows the order items were consumed in
        let result = collector.collect(2).await;
        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["hn_1", "hn_2"]);
    }
}

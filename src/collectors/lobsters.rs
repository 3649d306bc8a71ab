//! Lobste.rs collector (`hottest.json` and `newest.json` listings).

use super::format::{Entry, render_section, sentinel};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::LobstersSettings;
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument};

const NAME: &str = "Lobsters";
const HEADING: &str = "Lobste.rs";
const NAMESPACE: &str = "lobsters";
const DISPLAY_LIMIT: usize = 20;

pub struct LobstersCollector {
    ctx: CollectorContext,
    base_url: String,
    newest_limit: usize,
}

impl LobstersCollector {
    pub fn new(ctx: CollectorContext, settings: &LobstersSettings) -> Self {
        Self {
            ctx,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            newest_limit: settings.newest,
        }
    }

    #[instrument(level = "info", skip(self))]
    async fn collect_listing(&self, listing: &str, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/{listing}.json", self.base_url);
        let stories: Vec<Value> = self.ctx.get_json(NAME, &url, &[]).await?;

        let candidates = stories
            .iter()
            .take(limit * OVERFETCH_FACTOR)
            .map(|raw| parse_story(raw, &self.base_url));
        let stories = self.ctx.take_unseen(candidates, limit);

        info!(count = stories.len(), "Collected Lobsters stories");
        Ok(stories)
    }
}

fn parse_story(raw: &Value, base_url: &str) -> Option<CollectedItem> {
    let short_id = raw.get("short_id")?.as_str()?;
    let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();

    let url = raw
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{base_url}/s/{short_id}"));

    // Older API versions send the submitter as a plain string.
    let author = match raw.get("submitter_user") {
        Some(Value::String(name)) => name.clone(),
        Some(user) => user
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        None => "unknown".to_string(),
    };

    let tags = raw
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let timestamp = raw
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(CollectedItem {
        id: ContentId::new(NAMESPACE, short_id),
        source: NAME.to_string(),
        title: title.to_string(),
        url,
        rank_signal: raw.get("score").and_then(Value::as_i64).unwrap_or(0),
        secondary_signal: raw.get("comment_count").and_then(Value::as_i64).unwrap_or(0),
        timestamp,
        detail: ItemDetail::Story {
            author,
            tags,
            excerpt: None,
        },
    })
}

fn tags_label(item: &CollectedItem) -> String {
    match &item.detail {
        ItemDetail::Story { tags, .. } if !tags.is_empty() => {
            tags.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        }
        _ => "no tags".to_string(),
    }
}

#[async_trait]
impl Collector for LobstersCollector {
    fn name(&self) -> &str {
        NAME
    }

    async fn collect(&self, limit: usize) -> CollectorResult {
        let hottest = self.collect_listing("hottest", limit).await;
        let newest = self.collect_listing("newest", self.newest_limit).await;
        let cap = (limit + self.newest_limit).min(DISPLAY_LIMIT);
        self.ctx.claim(merge_ranked(NAME, vec![hottest, newest], cap))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }
        render_section(HEADING, &result.items, |item| {
            Entry::new(
                item.title.clone(),
                format!(
                    "Score: {} | Comments: {} | Tags: {}",
                    item.rank_signal,
                    item.secondary_signal,
                    tags_label(item)
                ),
            )
        })
    }
}

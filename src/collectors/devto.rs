//! DEV.to collector.
//!
//! One general "top articles" feed plus one feed per configured tag. Tag
//! feeds are requested one after another with a pause in between, the API
//! rate-limits bursts.

use super::format::{Entry, render_section, sentinel};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::DevToSettings;
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, instrument};

const NAME: &str = "DEV.to";
const NAMESPACE: &str = "devto";
const DISPLAY_LIMIT: usize = 20;
const TAG_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct Article {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tag_list: Vec<String>,
    #[serde(default)]
    positive_reactions_count: i64,
    #[serde(default)]
    comments_count: i64,
    published_at: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: String,
}

pub struct DevToCollector {
    ctx: CollectorContext,
    base_url: String,
    tags: Vec<String>,
    tag_limit: usize,
    top: String,
    tag_pause: Duration,
}

impl DevToCollector {
    pub fn new(ctx: CollectorContext, settings: &DevToSettings) -> Self {
        Self {
            ctx,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            tags: settings.tags.clone(),
            tag_limit: settings.tag_limit,
            top: settings.top.clone(),
            tag_pause: TAG_PAUSE,
        }
    }

    #[cfg(test)]
    pub fn with_tag_pause(mut self, pause: Duration) -> Self {
        self.tag_pause = pause;
        self
    }

    fn articles_url(&self, tag: Option<&str>, limit: usize) -> String {
        let mut url = format!(
            "{}/articles?per_page={}&top={}",
            self.base_url,
            limit * OVERFETCH_FACTOR,
            urlencoding::encode(&self.top)
        );
        if let Some(tag) = tag {
            url.push_str("&tag=");
            url.push_str(&urlencoding::encode(tag));
        }
        url
    }

    #[instrument(level = "info", skip(self))]
    async fn collect_articles(&self, tag: Option<&str>, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.articles_url(tag, limit);
        let articles: Vec<Value> = self.ctx.get_json(NAME, &url, &[]).await?;

        let candidates = articles
            .into_iter()
            .take(limit * OVERFETCH_FACTOR)
            .map(parse_article);
        let articles = self.ctx.take_unseen(candidates, limit);

        info!(count = articles.len(), "Collected DEV.to articles");
        Ok(articles)
    }
}

fn parse_article(raw: Value) -> Option<CollectedItem> {
    let article: Article = serde_json::from_value(raw).ok()?;

    let timestamp = article
        .published_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(CollectedItem {
        id: ContentId::new(NAMESPACE, article.id),
        source: NAME.to_string(),
        title: article.title,
        url: article.url,
        rank_signal: article.positive_reactions_count,
        secondary_signal: article.comments_count,
        timestamp,
        detail: ItemDetail::Story {
            author: article
                .user
                .map(|u| u.username)
                .unwrap_or_else(|| "unknown".to_string()),
            tags: article.tag_list,
            excerpt: Some(article.description).filter(|d| !d.trim().is_empty()),
        },
    })
}

#[async_trait]
impl Collector for DevToCollector {
    fn name(&self) -> &str {
        NAME
    }

    async fn collect(&self, limit: usize) -> CollectorResult {
        let mut feeds = vec![self.collect_articles(None, limit).await];

        for tag in &self.tags {
            if !self.tag_pause.is_zero() {
                tokio::time::sleep(self.tag_pause).await;
            }
            feeds.push(self.collect_articles(Some(tag), self.tag_limit).await);
        }

        let cap = (limit + self.tag_limit * self.tags.len()).min(DISPLAY_LIMIT);
        self.ctx.claim(merge_ranked(NAME, feeds, cap))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }
        render_section(NAME, &result.items, |item| {
            let tags = match &item.detail {
                ItemDetail::Story { tags, .. } if !tags.is_empty() => {
                    tags.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
                }
                _ => "no tags".to_string(),
            };
            Entry::new(
                item.title.clone(),
                format!(
                    "Reactions: {} | Comments: {} | Tags: {tags}",
                    item.rank_signal, item.secondary_signal
                ),
            )
        })
    }
}

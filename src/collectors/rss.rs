//! RSS 2.0 / Atom feed collector.
//!
//! Documents are parsed with `feed-rs`, which also covers RSS 1.0 and JSON
//! Feed. Entries have no stable id across feed flavors, so the identifier is
//! a digest of link and title.

use super::format::{Entry, render_section, sentinel};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::{FeedSpec, RssSettings};
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use crate::utils::{strip_tags, truncate_chars};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::{model, parser};
use itertools::Itertools;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

const NAME: &str = "RSS";
const NAMESPACE: &str = "rss";
const SUMMARY_CHARS: usize = 300;
const NOTE_CHARS: usize = 150;
const KEY_CHARS: usize = 12;
const DISPLAY_LIMIT: usize = 15;

/// One entry as found in the document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Summary, falling back to the full content; may contain HTML.
    pub summary: String,
    /// Publication date, falling back to the update date.
    pub published: Option<DateTime<Utc>>,
}

impl From<model::Entry> for FeedEntry {
    fn from(entry: model::Entry) -> Self {
        let link = entry_link(&entry);
        let summary = entry
            .summary
            .map(|text| text.content)
            .filter(|text| !text.trim().is_empty())
            .or_else(|| entry.content.and_then(|content| content.body))
            .unwrap_or_default();

        Self {
            title: entry.title.map(|t| t.content.trim().to_string()).unwrap_or_default(),
            link,
            summary: summary.trim().to_string(),
            published: entry.published.or(entry.updated),
        }
    }
}

/// The entry's page: the first link without `rel` or with
/// `rel="alternate"`, else the first non-empty one.
fn entry_link(entry: &model::Entry) -> String {
    let usable = || entry.links.iter().filter(|l| !l.href.trim().is_empty());
    usable()
        .find(|l| {
            l.rel
                .as_deref()
                .is_none_or(|rel| rel.is_empty() || rel.eq_ignore_ascii_case("alternate"))
        })
        .or_else(|| usable().next())
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default()
}

/// Parse an RSS, Atom or JSON Feed document into its entries, in document
/// order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, String> {
    let feed = parser::parse(xml.as_bytes()).map_err(|e| e.to_string())?;
    Ok(feed.entries.into_iter().map(FeedEntry::from).collect())
}

/// First 12 hex digits of the SHA-256 of `input`.
pub fn digest_prefix(input: &str) -> String {
    let mut hex = hex::encode(Sha256::digest(input.as_bytes()));
    hex.truncate(KEY_CHARS);
    hex
}

/// Identifier of an entry: the digest of `"{url}:{title}"`.
pub fn entry_key(url: &str, title: &str) -> String {
    digest_prefix(&format!("{url}:{title}"))
}

fn to_item(entry: FeedEntry, feed: &FeedSpec) -> Option<CollectedItem> {
    if entry.title.is_empty() && entry.link.is_empty() {
        return None;
    }
    let summary = truncate_chars(&strip_tags(&entry.summary), SUMMARY_CHARS);

    Some(CollectedItem {
        id: ContentId::new(NAMESPACE, entry_key(&entry.link, &entry.title)),
        source: feed.name.clone(),
        title: entry.title,
        url: entry.link,
        rank_signal: entry.published.map(|t| t.timestamp()).unwrap_or(0),
        secondary_signal: 0,
        timestamp: entry.published,
        detail: ItemDetail::FeedEntry {
            feed: feed.name.clone(),
            category: feed.category.clone(),
            summary,
        },
    })
}

pub struct RssCollector {
    ctx: CollectorContext,
    feeds: Vec<FeedSpec>,
}

impl RssCollector {
    pub fn new(ctx: CollectorContext, settings: &RssSettings) -> Self {
        Self {
            ctx,
            feeds: settings
                .feeds
                .iter()
                .filter(|f| !f.url.trim().is_empty())
                .cloned()
                .collect(),
        }
    }

    #[instrument(level = "info", skip_all, fields(feed = %feed.name))]
    async fn collect_feed(&self, feed: &FeedSpec, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let body = self.ctx.get_text(&feed.url, &[]).await?;
        let entries = parse_feed(&body).map_err(|message| CollectError::Decode {
            feed: feed.name.clone(),
            message,
        })?;

        let candidates = entries
            .into_iter()
            .take(limit * OVERFETCH_FACTOR)
            .map(|entry| to_item(entry, feed));
        let entries = self.ctx.take_unseen(candidates, limit);

        info!(count = entries.len(), "Collected feed entries");
        Ok(entries)
    }

    fn categories(&self) -> Vec<&str> {
        self.feeds.iter().map(|f| f.category.as_str()).unique().collect()
    }
}

fn category_of(item: &CollectedItem) -> &str {
    match &item.detail {
        ItemDetail::FeedEntry { category, .. } => category,
        _ => "general",
    }
}

/// Keep the first `max` items of every category, in order.
fn cap_per_category(mut result: CollectorResult, max: usize) -> CollectorResult {
    let mut counts: HashMap<String, usize> = HashMap::new();
    result.items.retain(|item| {
        let seen = counts.entry(category_of(item).to_string()).or_default();
        *seen += 1;
        *seen <= max
    });
    result
}

#[async_trait]
impl Collector for RssCollector {
    fn name(&self) -> &str {
        NAME
    }

    /// `limit` applies per feed; each category keeps its newest entries.
    async fn collect(&self, limit: usize) -> CollectorResult {
        let mut feeds = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            let result = self.collect_feed(feed, limit).await;
            if let Err(e) = &result {
                warn!(feed = %feed.name, error = %e, "Feed failed");
            }
            feeds.push(result);
        }
        let merged = merge_ranked(NAME, feeds, limit * self.feeds.len());
        self.ctx.claim(cap_per_category(merged, DISPLAY_LIMIT))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }

        let mut out = String::new();
        for category in self.categories() {
            let items: Vec<&CollectedItem> = result
                .items
                .iter()
                .filter(|item| category_of(item) == category)
                .collect();
            if items.is_empty() {
                continue;
            }
            let heading = format!("RSS - {}", category.to_uppercase());
            out.push_str(&render_section(&heading, items, |item| {
                let entry = Entry::new(format!("[{}] {}", item.source, item.title), "");
                match &item.detail {
                    ItemDetail::FeedEntry { summary, .. } if !summary.is_empty() => {
                        entry.with_note(format!("Summary: {}...", truncate_chars(summary, NOTE_CHARS)))
                    }
                    _ => entry,
                }
            }));
        }
        out
    }
}

//! Reddit collector over the public listing JSON (`/r/{sub}/{sort}.json`).
//!
//! Each configured subreddit is a sub-feed; `limit` applies per subreddit.

use super::format::{Entry, render_section, sentinel};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::RedditSettings;
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use crate::utils::{collapse_whitespace, truncate_chars};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

const NAME: &str = "Reddit";
const NAMESPACE: &str = "reddit";
const EXCERPT_CHARS: usize = 200;
const DISPLAY_LIMIT: usize = 40;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    author: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    stickied: bool,
}

pub struct RedditCollector {
    ctx: CollectorContext,
    base_url: String,
    subreddits: Vec<String>,
    sort: String,
}

impl RedditCollector {
    pub fn new(ctx: CollectorContext, settings: &RedditSettings) -> Self {
        Self {
            ctx,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            subreddits: settings.subreddits.clone(),
            sort: settings.sort.clone(),
        }
    }

    /// `{base}/r/{subreddit}/{sort}.json?limit=N`, with the subreddit
    /// percent-encoded as one path segment.
    fn listing_url(&self, subreddit: &str, fetch: usize) -> Result<String, CollectError> {
        let sort = match self.sort.as_str() {
            "top" => "top",
            "new" => "new",
            _ => "hot",
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| CollectError::Url(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| CollectError::Url(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["r", subreddit, &format!("{sort}.json")]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &fetch.to_string());
            if sort == "top" {
                query.append_pair("t", "day");
            }
        }
        Ok(url.into())
    }

    #[instrument(level = "info", skip(self))]
    async fn collect_subreddit(&self, subreddit: &str, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.listing_url(subreddit, limit * OVERFETCH_FACTOR)?;
        let listing: Listing = self.ctx.get_json(NAME, &url, &[]).await?;

        let candidates = listing
            .data
            .children
            .into_iter()
            .take(limit * OVERFETCH_FACTOR)
            .filter_map(|child| serde_json::from_value::<Post>(child.data).ok())
            .filter(|post| !post.stickied)
            .map(|post| parse_post(post, subreddit, &self.base_url));
        let posts = self.ctx.take_unseen(candidates, limit);

        info!(count = posts.len(), "Collected subreddit posts");
        Ok(posts)
    }
}

fn parse_post(post: Post, subreddit: &str, base_url: &str) -> Option<CollectedItem> {
    if post.id.is_empty() || post.title.is_empty() {
        return None;
    }

    let url = if post.url.is_empty() {
        format!("{base_url}{}", post.permalink)
    } else {
        post.url
    };
    let excerpt = collapse_whitespace(&post.selftext);

    Some(CollectedItem {
        id: ContentId::new(NAMESPACE, &post.id),
        source: format!("r/{subreddit}"),
        title: post.title,
        url,
        rank_signal: post.score,
        secondary_signal: post.num_comments,
        timestamp: DateTime::from_timestamp(post.created_utc as i64, 0),
        detail: ItemDetail::Story {
            author: post.author,
            tags: vec![subreddit.to_string()],
            excerpt: Some(excerpt).filter(|e| !e.is_empty()),
        },
    })
}

#[async_trait]
impl Collector for RedditCollector {
    fn name(&self) -> &str {
        NAME
    }

    async fn collect(&self, limit: usize) -> CollectorResult {
        let mut feeds = Vec::with_capacity(self.subreddits.len());
        for subreddit in &self.subreddits {
            feeds.push(self.collect_subreddit(subreddit, limit).await);
        }
        let cap = (limit * self.subreddits.len()).min(DISPLAY_LIMIT);
        self.ctx.claim(merge_ranked(NAME, feeds, cap))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }
        render_section(NAME, &result.items, |item| {
            let entry = Entry::new(
                format!("[{}] {}", item.source, item.title),
                format!("Score: {} | Comments: {}", item.rank_signal, item.secondary_signal),
            );
            match &item.detail {
                ItemDetail::Story {
                    excerpt: Some(text), ..
                } => entry.with_note(format!("Excerpt: {}...", truncate_chars(text, EXCERPT_CHARS))),
                _ => entry,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::{assert_seen_matches_rendered, context};
    use crate::fetch::testing::StubFetcher;

    const BASE: &str = "https://reddit.test";

    fn listing(posts: &[String]) -> String {
        let children: Vec<String> = posts
            .iter()
            .map(|p| format!(r#"{{"kind": "t3", "data": {p}}}"#))
            .collect();
        format!(r#"{{"kind": "Listing", "data": {{"children": [{}]}}}}"#, children.join(","))
    }

    fn post(id: &str, score: i64, stickied: bool) -> String {
        format!(
            r#"{{"id": "{id}", "title": "Post {id}", "url": "https://example.com/{id}", "permalink": "/r/rust/comments/{id}/",
                "score": {score}, "num_comments": 4, "author": "ferris", "created_utc": 1700000000.0,
                "selftext": "Line one\n\nline   two", "stickied": {stickied}}}"#
        )
    }

    fn collector(subs: &[&str], sort: &str, fetch: StubFetcher) -> RedditCollector {
        let settings = RedditSettings {
            enabled: true,
            base_url: BASE.to_string(),
            subreddits: subs.iter().map(|s| s.to_string()).collect(),
            sort: sort.to_string(),
            ..RedditSettings::default()
        };
        RedditCollector::new(context(fetch), &settings)
    }

    #[tokio::test]
    async fn test_stickied_posts_are_skipped() {
        let body = listing(&[post("a1", 5, true), post("b2", 50, false), post("c3", 10, false)]);
        let fetch = StubFetcher::new().with(&format!("{BASE}/r/rust/hot.json?limit=4"), body);
        let result = collector(&["rust"], "hot", fetch).collect(2).await;

        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["reddit_b2", "reddit_c3"]);
        assert_eq!(result.items[0].source, "r/rust");
    }

    #[tokio::test]
    async fn test_top_sort_uses_day_window_and_merges_subreddits() {
        let fetch = StubFetcher::new()
            .with(
                &format!("{BASE}/r/rust/top.json?limit=2&t=day"),
                listing(&[post("r1", 3, false)]),
            )
            .with_status(&format!("{BASE}/r/golang/top.json?limit=2&t=day"), 429)
            .with(
                &format!("{BASE}/r/zig/top.json?limit=2&t=day"),
                listing(&[post("z1", 9, false)]),
            );
        let result = collector(&["rust", "golang", "zig"], "top", fetch).collect(1).await;
        assert!(!result.is_failed());
        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["reddit_z1", "reddit_r1"]);
    }

    #[tokio::test]
    async fn test_format_includes_excerpt() {
        let fetch = StubFetcher::new().with(
            &format!("{BASE}/r/rust/new.json?limit=2"),
            listing(&[post("n1", 1, false)]),
        );
        let c = collector(&["rust"], "new", fetch);
        let result = c.collect(1).await;
        let text = c.format_for_analysis(&result);
        assert!(text.contains("1. [r/rust] Post n1\n   Score: 1 | Comments: 4\n   Excerpt: Line one line two...\n"));
    }

    #[tokio::test]
    async fn test_no_subreddits_is_empty_not_failed() {
        let result = collector(&[], "hot", StubFetcher::new()).collect(5).await;
        assert!(result.is_empty());
        assert!(!result.is_failed());
    }

    #[test]
    fn test_listing_url_encodes_subreddit_as_one_segment() {
        let c = collector(&[], "top", StubFetcher::new());
        assert_eq!(
            c.listing_url("rust lang/x", 4).unwrap(),
            "https://reddit.test/r/rust%20lang%2Fx/top.json?limit=4&t=day"
        );
        assert_eq!(
            collector(&[], "bogus", StubFetcher::new()).listing_url("rust", 2).unwrap(),
            "https://reddit.test/r/rust/hot.json?limit=2"
        );
    }

    #[tokio::test]
    async fn test_invalid_base_url_fails_the_subreddit() {
        let settings = RedditSettings {
            enabled: true,
            base_url: "not a url".to_string(),
            subreddits: vec!["rust".to_string()],
            ..RedditSettings::default()
        };
        let result = RedditCollector::new(context(StubFetcher::new()), &settings).collect(5).await;
        assert!(matches!(result.failure, Some(CollectError::Url(_))));
    }

    #[tokio::test]
    async fn test_many_subreddits_claim_only_rendered_posts() {
        let subs = ["rust", "golang", "zig"];
        let mut fetch = StubFetcher::new();
        for (s, sub) in subs.iter().enumerate() {
            let posts: Vec<String> = (0..20).map(|n| post(&format!("{sub}{n}"), (s * 20 + n) as i64, false)).collect();
            fetch = fetch.with(&format!("{BASE}/r/{sub}/hot.json?limit=40"), listing(&posts));
        }
        let settings = RedditSettings {
            enabled: true,
            base_url: BASE.to_string(),
            subreddits: subs.iter().map(|s| s.to_string()).collect(),
            sort: "hot".to_string(),
            ..RedditSettings::default()
        };
        let ctx = context(fetch);
        let cache = ctx.cache.clone();
        let c = RedditCollector::new(ctx, &settings);

        let result = c.collect(20).await;
        assert_eq!(result.len(), DISPLAY_LIMIT);
        let text = c.format_for_analysis(&result);
        assert_seen_matches_rendered(&cache, &result, &text);
        assert!(!cache.is_seen(&ContentId::new(NAMESPACE, "rust0")));
    }
}

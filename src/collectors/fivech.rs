//! 5ch headline page scraper.
//!
//! The headline page is a plain list of thread links whose text ends in the
//! response count, e.g. `Some thread title (123)`. Thread numbers are only
//! unique within a board, so ids are `5ch_{board}_{thread}`.

use super::format::{Entry, render_section, sentinel};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, single_feed};
use crate::config::FiveChSettings;
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use crate::utils::collapse_whitespace;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, instrument};
use url::Url;

const NAME: &str = "5ch";
const HEADING: &str = "5ch (5ちゃんねる)";
const NAMESPACE: &str = "5ch";
const MIN_TITLE_CHARS: usize = 5;
const DISPLAY_LIMIT: usize = 15;

static THREAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d+)/?$").expect("static regex"));
static READ_CGI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/read\.cgi/([^/]+)/(\d+)/?$").expect("static regex"));
static RES_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\((\d+)\)$").expect("static regex"));
static BOARD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"://([^./]+)\.5ch\.net").expect("static regex"));

/// Split `"title (123)"` into the title and the response count.
pub fn split_res_count(text: &str) -> (String, i64) {
    match RES_COUNT_RE.captures(text) {
        Some(caps) => {
            let count = caps[1].parse().unwrap_or(0);
            let start = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
            (text[..start].to_string(), count)
        }
        None => (text.to_string(), 0),
    }
}

/// Parse the headline page into candidates, in page order.
pub fn parse_headlines(html: &str, page_url: &str) -> Result<Vec<Option<CollectedItem>>, CollectError> {
    let item_sel = Selector::parse("li").map_err(|e| CollectError::Selector(e.to_string()))?;
    let link_sel = Selector::parse("a[href]").map_err(|e| CollectError::Selector(e.to_string()))?;
    let base = Url::parse(page_url).map_err(|e| CollectError::Decode {
        feed: NAME.to_string(),
        message: format!("{page_url}: {e}"),
    })?;
    let document = Html::parse_document(html);

    let rows = document
        .select(&item_sel)
        .map(|li| {
            let link = li.select(&link_sel).next()?;
            let href = base.join(link.value().attr("href")?).ok()?.to_string();
            if !href.contains("5ch.net") {
                return None;
            }

            let text = collapse_whitespace(&link.text().collect::<Vec<_>>().join(" "));
            if text.chars().count() < MIN_TITLE_CHARS {
                return None;
            }

            let (title, res_count) = split_res_count(&text);
            let board = BOARD_RE
                .captures(&href)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| NAME.to_string());
            let key = match READ_CGI_RE.captures(&href) {
                Some(caps) => format!("{}_{}", &caps[1], &caps[2]),
                None => format!("{board}_{}", THREAD_RE.captures(&href)?.get(1)?.as_str()),
            };

            Some(CollectedItem {
                id: ContentId::new(NAMESPACE, key),
                source: NAME.to_string(),
                title,
                url: href,
                rank_signal: res_count,
                secondary_signal: 0,
                timestamp: None,
                detail: ItemDetail::Thread { board },
            })
        })
        .collect();
    Ok(rows)
}

pub struct FiveChCollector {
    ctx: CollectorContext,
    url: String,
}

impl FiveChCollector {
    pub fn new(ctx: CollectorContext, settings: &FiveChSettings) -> Self {
        Self {
            ctx,
            url: settings.url.clone(),
        }
    }

    #[instrument(level = "info", skip(self))]
    async fn collect_threads(&self, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let html = self.ctx.get_text(&self.url, &self.ctx.page_headers()).await?;
        let rows = parse_headlines(&html, &self.url)?;

        let threads = self
            .ctx
            .take_unseen(rows.into_iter().take(limit * OVERFETCH_FACTOR), limit);
        info!(count = threads.len(), "Collected 5ch threads");
        Ok(threads)
    }
}

#[async_trait]
impl Collector for FiveChCollector {
    fn name(&self) -> &str {
        NAME
    }

    /// Threads keep the headline page order.
    async fn collect(&self, limit: usize) -> CollectorResult {
        let threads = self.collect_threads(limit.min(DISPLAY_LIMIT)).await;
        self.ctx.claim(single_feed(threads))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }
        render_section(HEADING, &result.items, |item| {
            let board = match &item.detail {
                ItemDetail::Thread { board } => board.as_str(),
                _ => NAME,
            };
            Entry::new(
                item.title.clone(),
                format!("Responses: {} | Board: {board}", item.rank_signal),
            )
        })
    }
}

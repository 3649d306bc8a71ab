//! Community board scrapers (DCInside, Clien, FMKorea, Ruliweb, Ppomppu).
//!
//! The five sites differ only in markup, so one [`BoardCollector`] is driven
//! by a declarative [`BoardLayout`] per site: which rows to take, where the
//! title and link are, how to get a post number out of the row and where the
//! view, vote and comment counts live. Every configured board of a site is a
//! sub-feed; posts are ranked by views.

use super::format::{Entry, bracketed, render_section, sentinel};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::{BoardSiteSettings, BoardSpec};
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use crate::utils::{collapse_whitespace, first_number, parse_count};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

const DISPLAY_LIMIT: usize = 15;

/// Where a row's post number comes from.
#[derive(Debug, Clone, Copy)]
pub enum IdRule {
    /// An attribute on the row element (`data-no`).
    RowAttribute(&'static str),
    /// First capture group of a pattern applied to the post link.
    HrefPattern(&'static str),
}

/// Where a count comes from.
#[derive(Debug, Clone, Copy)]
pub enum CountRule {
    /// Text of the first element matching a selector inside the row.
    Cell(&'static str),
    /// The `offset`-th `td` counted from the end, if the row has at least
    /// `min_cells` cells.
    CellFromEnd { offset: usize, min_cells: usize },
}

/// Markup description of one site's listing pages.
#[derive(Debug)]
pub struct BoardLayout {
    pub site: &'static str,
    pub heading: &'static str,
    /// Identifier prefix; boards get their own prefix when `per_board_ids`.
    pub namespace: &'static str,
    pub per_board_ids: bool,
    pub base_url: &'static str,
    pub row: &'static str,
    pub link: &'static str,
    /// Title element when it is not the link itself.
    pub title: Option<&'static str>,
    /// Rows carrying this class are notices and are skipped.
    pub skip_class: Option<&'static str>,
    /// Per-row board label (aggregated "best" pages).
    pub label: Option<&'static str>,
    pub id: IdRule,
    pub views: CountRule,
    pub votes: CountRule,
    pub comments: CountRule,
    /// `(tag, name, path)` used when no boards are configured.
    pub default_boards: &'static [(&'static str, &'static str, &'static str)],
}

pub static DCINSIDE: BoardLayout = BoardLayout {
    site: "DCInside",
    heading: "DCInside",
    namespace: "dc",
    per_board_ids: true,
    base_url: "https://gall.dcinside.com",
    row: "tr.ub-content",
    link: ".gall_tit a",
    title: None,
    skip_class: Some("us-post"),
    label: None,
    id: IdRule::RowAttribute("data-no"),
    views: CountRule::Cell(".gall_count"),
    votes: CountRule::Cell(".gall_recommend"),
    comments: CountRule::Cell(".reply_num"),
    default_boards: &[("hit", "HIT Gallery", "/board/lists?id=hit")],
};

pub static CLIEN: BoardLayout = BoardLayout {
    site: "Clien",
    heading: "Clien",
    namespace: "clien",
    per_board_ids: false,
    base_url: "https://www.clien.net",
    row: ".list_item",
    link: "a.list_subject",
    title: Some(".subject_fixed"),
    skip_class: Some("notice"),
    label: None,
    id: IdRule::HrefPattern(r"/(\d+)(?:\?|$)"),
    views: CountRule::Cell(".hit"),
    votes: CountRule::Cell(".list_symph"),
    comments: CountRule::Cell(".rSymph05"),
    default_boards: &[("park", "Park", "/service/board/park?od=T31&po=0")],
};

pub static FMKOREA: BoardLayout = BoardLayout {
    site: "FMKorea",
    heading: "FMKorea",
    namespace: "fm",
    per_board_ids: false,
    base_url: "https://www.fmkorea.com",
    row: ".li",
    link: ".title a",
    title: None,
    skip_class: Some("notice"),
    label: None,
    id: IdRule::HrefPattern(r"/(\d+)"),
    views: CountRule::Cell(".count"),
    votes: CountRule::Cell(".votes"),
    comments: CountRule::Cell(".comment_count"),
    default_boards: &[("best", "Best", "/index.php?mid=best")],
};

pub static RULIWEB: BoardLayout = BoardLayout {
    site: "Ruliweb",
    heading: "Ruliweb",
    namespace: "ruliweb",
    per_board_ids: false,
    base_url: "https://bbs.ruliweb.com",
    row: "tr.table_body",
    link: ".subject a.deco",
    title: None,
    skip_class: Some("notice"),
    label: Some(".board_name"),
    id: IdRule::HrefPattern(r"/(\d+)(?:\?|$)"),
    views: CountRule::Cell(".hit"),
    votes: CountRule::Cell(".recomd"),
    comments: CountRule::Cell(".reply"),
    default_boards: &[("best", "Best", "/best")],
};

pub static PPOMPPU: BoardLayout = BoardLayout {
    site: "Ppomppu",
    heading: "Ppomppu",
    namespace: "ppomppu",
    per_board_ids: true,
    base_url: "https://www.ppomppu.co.kr",
    row: "tr.line, tr.list0, tr.list1",
    link: ".title a",
    title: None,
    skip_class: None,
    label: None,
    id: IdRule::HrefPattern(r"no=(\d+)"),
    views: CountRule::CellFromEnd {
        offset: 0,
        min_cells: 5,
    },
    votes: CountRule::CellFromEnd {
        offset: 1,
        min_cells: 5,
    },
    comments: CountRule::Cell(".list_comment2"),
    default_boards: &[("hot", "Hot", "/hot.php")],
};

/// Compiled form of a [`BoardLayout`].
struct CompiledLayout {
    row: Selector,
    link: Selector,
    title: Option<Selector>,
    label: Option<Selector>,
    cell: Selector,
    id_pattern: Option<Regex>,
    views: Option<Selector>,
    votes: Option<Selector>,
    comments: Option<Selector>,
}

fn selector(css: &str) -> Result<Selector, CollectError> {
    Selector::parse(css).map_err(|e| CollectError::Selector(format!("{css}: {e}")))
}

fn count_selector(rule: CountRule) -> Result<Option<Selector>, CollectError> {
    match rule {
        CountRule::Cell(css) => selector(css).map(Some),
        _ => Ok(None),
    }
}

impl CompiledLayout {
    fn new(layout: &BoardLayout) -> Result<Self, CollectError> {
        let id_pattern = match layout.id {
            IdRule::HrefPattern(pattern) => Some(
                Regex::new(pattern).map_err(|e| CollectError::Selector(format!("{pattern}: {e}")))?,
            ),
            IdRule::RowAttribute(_) => None,
        };
        Ok(Self {
            row: selector(layout.row)?,
            link: selector(layout.link)?,
            title: layout.title.map(selector).transpose()?,
            label: layout.label.map(selector).transpose()?,
            cell: selector("td")?,
            id_pattern,
            views: count_selector(layout.views)?,
            votes: count_selector(layout.votes)?,
            comments: count_selector(layout.comments)?,
        })
    }
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn count(row: ElementRef, rule: CountRule, compiled: Option<&Selector>, cells: &Selector, parse: fn(&str) -> i64) -> i64 {
    match rule {
        CountRule::Cell(_) => compiled
            .and_then(|s| row.select(s).next())
            .map(|el| parse(&element_text(el)))
            .unwrap_or(0),
        CountRule::CellFromEnd { offset, min_cells } => {
            let tds: Vec<ElementRef> = row.select(cells).collect();
            if tds.len() < min_cells {
                return 0;
            }
            tds.iter()
                .rev()
                .nth(offset)
                .map(|el| parse(&element_text(*el)))
                .unwrap_or(0)
        }
    }
}

/// Parse one listing page into candidates, in page order.
pub fn parse_board_page(
    layout: &BoardLayout,
    board: &BoardSpec,
    html: &str,
    page_url: &str,
) -> Result<Vec<Option<CollectedItem>>, CollectError> {
    let compiled = CompiledLayout::new(layout)?;
    let base = Url::parse(page_url).map_err(|e| CollectError::Decode {
        feed: layout.site.to_string(),
        message: format!("{page_url}: {e}"),
    })?;
    let document = Html::parse_document(html);

    let namespace = if layout.per_board_ids {
        format!("{}_{}", layout.namespace, board.tag)
    } else {
        layout.namespace.to_string()
    };

    Ok(document
        .select(&compiled.row)
        .map(|row| parse_row(layout, &compiled, board, &namespace, &base, row))
        .collect())
}

fn parse_row(
    layout: &BoardLayout,
    compiled: &CompiledLayout,
    board: &BoardSpec,
    namespace: &str,
    base: &Url,
    row: ElementRef,
) -> Option<CollectedItem> {
    if let Some(skip) = layout.skip_class {
        if row.value().classes().any(|c| c == skip) {
            return None;
        }
    }

    let link = row.select(&compiled.link).next()?;
    let href = link.value().attr("href")?.trim();

    let title = match &compiled.title {
        Some(sel) => row.select(sel).next().map(element_text)?,
        None => link
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    };
    if title.is_empty() {
        return None;
    }

    let post_no = match (layout.id, &compiled.id_pattern) {
        (IdRule::RowAttribute(attr), _) => row.value().attr(attr)?.trim().to_string(),
        (IdRule::HrefPattern(_), Some(re)) => re.captures(href)?.get(1)?.as_str().to_string(),
        (IdRule::HrefPattern(_), None) => return None,
    };
    if post_no.is_empty() {
        return None;
    }

    let url = match base.join(href) {
        Ok(url) => url.to_string(),
        Err(e) => {
            debug!(%href, error = %e, "Unresolvable post link");
            return None;
        }
    };

    let label = compiled
        .label
        .as_ref()
        .and_then(|sel| row.select(sel).next())
        .map(element_text)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| board.name.clone());

    Some(CollectedItem {
        id: ContentId::new(namespace, &post_no),
        source: layout.site.to_string(),
        title,
        url,
        rank_signal: count(row, layout.views, compiled.views.as_ref(), &compiled.cell, parse_count),
        secondary_signal: count(row, layout.comments, compiled.comments.as_ref(), &compiled.cell, first_number),
        timestamp: None,
        detail: ItemDetail::Post {
            board: label,
            votes: count(row, layout.votes, compiled.votes.as_ref(), &compiled.cell, parse_count),
        },
    })
}

/// One community site, with every configured board as a sub-feed.
pub struct BoardCollector {
    ctx: CollectorContext,
    layout: &'static BoardLayout,
    boards: Vec<BoardSpec>,
}

impl BoardCollector {
    pub fn new(ctx: CollectorContext, layout: &'static BoardLayout, settings: &BoardSiteSettings) -> Self {
        let boards = if settings.boards.is_empty() {
            layout
                .default_boards
                .iter()
                .map(|(tag, name, path)| BoardSpec {
                    tag: tag.to_string(),
                    name: name.to_string(),
                    path: path.to_string(),
                })
                .collect()
        } else {
            settings.boards.clone()
        };
        Self { ctx, layout, boards }
    }

    #[cfg(test)]
    pub fn boards(&self) -> &[BoardSpec] {
        &self.boards
    }

    fn board_url(&self, board: &BoardSpec) -> String {
        if board.path.starts_with("http") {
            board.path.clone()
        } else {
            format!("{}{}", self.layout.base_url, board.path)
        }
    }

    #[instrument(level = "info", skip_all, fields(site = self.layout.site, board = %board.tag))]
    async fn collect_board(&self, board: &BoardSpec, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.board_url(board);
        let html = self.ctx.get_text(&url, &self.ctx.page_headers()).await?;
        let rows = parse_board_page(self.layout, board, &html, &url)?;

        let posts = self
            .ctx
            .take_unseen(rows.into_iter().take(limit * OVERFETCH_FACTOR), limit);
        info!(count = posts.len(), "Collected board posts");
        Ok(posts)
    }
}

#[async_trait]
impl Collector for BoardCollector {
    fn name(&self) -> &str {
        self.layout.site
    }

    async fn collect(&self, limit: usize) -> CollectorResult {
        let mut feeds = Vec::with_capacity(self.boards.len());
        for board in &self.boards {
            feeds.push(self.collect_board(board, limit).await);
        }
        let cap = (limit * self.boards.len()).min(DISPLAY_LIMIT);
        self.ctx.claim(merge_ranked(self.layout.site, feeds, cap))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(self.layout.site);
        }
        render_section(self.layout.heading, &result.items, |item| {
            let (board, votes) = match &item.detail {
                ItemDetail::Post { board, votes } => (board.as_str(), *votes),
                _ => ("", 0),
            };
            Entry::new(
                format!("{}{}", bracketed(board), item.title),
                format!(
                    "Views: {} | Votes: {votes} | Comments: {}",
                    item.rank_signal, item.secondary_signal
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::{assert_seen_matches_rendered, context};
    use crate::fetch::testing::StubFetcher;

    fn board(tag: &str, name: &str, path: &str) -> BoardSpec {
        BoardSpec {
            tag: tag.to_string(),
            name: name.to_string(),
            path: path.to_string(),
        }
    }

    const DC_PAGE: &str = r#"<html><body><table><tbody>
<tr class="ub-content us-post" data-no="1"><td class="gall_tit"><a href="/board/view/?id=hit&no=1">Notice</a></td></tr>
<tr class="ub-content" data-no="1234">
  <td class="gall_tit"><a href="/board/view/?id=hit&amp;no=1234">Hot take</a> <a class="reply_numbox"><span class="reply_num">[12]</span></a></td>
  <td class="gall_count">1,532</td><td class="gall_recommend">88</td>
</tr>
<tr class="ub-content" data-no="1235">
  <td class="gall_tit"><a href="/board/view/?id=hit&amp;no=1235">Quiet post</a></td>
  <td class="gall_count">-</td><td class="gall_recommend">0</td>
</tr>
</tbody></table></body></html>"#;

    #[test]
    fn test_parse_dcinside() {
        let spec = board("hit", "HIT Gallery", "/board/lists?id=hit");
        let rows =
            parse_board_page(&DCINSIDE, &spec, DC_PAGE, "https://gall.dcinside.com/board/lists?id=hit").unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_none());

        let post = rows[1].as_ref().unwrap();
        assert_eq!(post.id.as_str(), "dc_hit_1234");
        assert_eq!(post.title, "Hot take");
        assert_eq!(post.url, "https://gall.dcinside.com/board/view/?id=hit&no=1234");
        assert_eq!(post.rank_signal, 1532);
        assert_eq!(post.secondary_signal, 12);
        assert_eq!(
            post.detail,
            ItemDetail::Post {
                board: "HIT Gallery".to_string(),
                votes: 88
            }
        );

        let quiet = rows[2].as_ref().unwrap();
        assert_eq!(quiet.rank_signal, 0);
    }

    #[test]
    fn test_parse_ppomppu_counts_from_trailing_cells() {
        let html = r#"<table>
<tr class="list0">
  <td>1</td><td>writer</td>
  <td class="title"><a href="view.php?id=stock&amp;no=777">Market open</a> <span class="list_comment2">5</span></td>
  <td>25/06/10</td><td>-2</td><td>4,021</td>
</tr>
<tr class="list1"><td class="title"><a href="view.php?id=stock">No number</a></td></tr>
</table>"#;
        let spec = board("stock", "Stocks", "/zboard/zboard.php?id=stock");
        let rows =
            parse_board_page(&PPOMPPU, &spec, html, "https://www.ppomppu.co.kr/zboard/zboard.php?id=stock").unwrap();

        let post = rows[0].as_ref().unwrap();
        assert_eq!(post.id.as_str(), "ppomppu_stock_777");
        assert_eq!(post.url, "https://www.ppomppu.co.kr/zboard/view.php?id=stock&no=777");
        assert_eq!(post.rank_signal, 4021);
        assert_eq!(post.secondary_signal, 5);
        assert!(matches!(post.detail, ItemDetail::Post { votes: -2, .. }));
        assert!(rows[1].is_none());
    }

    #[test]
    fn test_parse_ruliweb_uses_row_label() {
        let html = r#"<table><tbody>
<tr class="table_body">
  <td class="board_name">Games</td>
  <td class="subject"><a class="deco" href="https://bbs.ruliweb.com/best/board/300143/read/65432100?m=all">New console</a>
    <span class="reply">(31)</span></td>
  <td class="recomd">19</td><td class="hit">12,345</td>
</tr>
</tbody></table>"#;
        let spec = board("best", "Best", "/best");
        let rows = parse_board_page(&RULIWEB, &spec, html, "https://bbs.ruliweb.com/best").unwrap();
        let post = rows[0].as_ref().unwrap();
        assert_eq!(post.id.as_str(), "ruliweb_65432100");
        assert_eq!(post.secondary_signal, 31);
        assert_eq!(
            post.detail,
            ItemDetail::Post {
                board: "Games".to_string(),
                votes: 19
            }
        );
    }

    #[test]
    fn test_parse_clien_separate_title_element() {
        let html = r#"<div class="list_content">
<div class="list_item symph_row">
  <a class="list_subject" href="/service/board/park/18712345?od=T31&amp;po=0">
    <span class="subject_fixed" title="Weekend plans">Weekend plans</span>
  </a>
  <span class="rSymph05">7</span>
  <div class="list_hit"><span class="hit">2.3k</span></div>
</div>
</div>"#;
        let spec = board("park", "Park", "/service/board/park?od=T31&po=0");
        let rows = parse_board_page(&CLIEN, &spec, html, "https://www.clien.net/service/board/park").unwrap();
        let post = rows[0].as_ref().unwrap();
        assert_eq!(post.id.as_str(), "clien_18712345");
        assert_eq!(post.title, "Weekend plans");
        assert_eq!(post.rank_signal, 2300);
        assert_eq!(post.secondary_signal, 7);
    }

    #[tokio::test]
    async fn test_collect_uses_default_board_and_ranks_by_views() {
        let fetch = StubFetcher::new().with("https://gall.dcinside.com/board/lists?id=hit", DC_PAGE);
        let collector = BoardCollector::new(context(fetch), &DCINSIDE, &BoardSiteSettings::default());
        assert_eq!(collector.boards().len(), 1);

        let result = collector.collect(10).await;
        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["dc_hit_1234", "dc_hit_1235"]);

        let text = collector.format_for_analysis(&result);
        assert!(text.contains("## DCInside"));
        assert!(text.contains("1. [HIT Gallery] Hot take\n   Views: 1532 | Votes: 88 | Comments: 12\n"));
    }

    #[tokio::test]
    async fn test_configured_boards_replace_defaults() {
        let settings = BoardSiteSettings {
            enabled: true,
            limit: 5,
            boards: vec![board("stockus", "US Stocks", "/board/lists?id=stockus")],
        };
        let collector = BoardCollector::new(context(StubFetcher::new()), &DCINSIDE, &settings);
        assert_eq!(collector.boards()[0].tag, "stockus");

        let result = collector.collect(5).await;
        assert!(result.is_failed());
        assert_eq!(collector.format_for_analysis(&result), sentinel("DCInside"));
    }

    #[tokio::test]
    async fn test_busy_board_claims_only_rendered_posts() {
        let rows: String = (1..=25)
            .map(|n| {
                format!(
                    r#"<tr class="ub-content" data-no="{n}"><td class="gall_tit"><a href="/board/view/?id=hit&amp;no={n}">Post {n}</a></td><td class="gall_count">{n}</td><td class="gall_recommend">0</td></tr>"#
                )
            })
            .collect();
        let html = format!("<html><body><table><tbody>{rows}</tbody></table></body></html>");
        let fetch = StubFetcher::new().with("https://gall.dcinside.com/board/lists?id=hit", html);
        let ctx = context(fetch);
        let cache = ctx.cache.clone();
        let collector = BoardCollector::new(ctx, &DCINSIDE, &BoardSiteSettings::default());

        let result = collector.collect(25).await;
        assert_eq!(result.len(), DISPLAY_LIMIT);
        let text = collector.format_for_analysis(&result);
        assert_seen_matches_rendered(&cache, &result, &text);
        assert!(!cache.is_seen(&ContentId::new("dc_hit", 1)));
    }
}

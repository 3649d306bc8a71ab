//! GitHub Trending scraper.
//!
//! The trending page has no API; each repository is one `article.Box-row`.
//!
//! ```text
//! article.Box-row
//!   h2 a[href="/owner/name"]
//!   p                                   description
//!   [itemprop=programmingLanguage]      language
//!   a[href$="/stargazers"]              total stars
//!   a[href$="/forks"]                   forks
//!   span.float-sm-right                 "1,234 stars today"
//! ```

use super::format::{Entry, bracketed, render_section, sentinel, thousands};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::GitHubTrendingSettings;
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use crate::utils::{collapse_whitespace, parse_count, truncate_chars};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};

const NAME: &str = "GitHub Trending";
const NAMESPACE: &str = "gh";
const DESCRIPTION_CHARS: usize = 200;
const NOTE_CHARS: usize = 100;
const DISPLAY_LIMIT: usize = 20;

/// Compiled selectors for one page.
struct RowSelectors {
    row: Selector,
    name: Selector,
    description: Selector,
    language: Selector,
    stars: Selector,
    forks: Selector,
    today: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self, CollectError> {
        let parse =
            |css: &str| Selector::parse(css).map_err(|e| CollectError::Selector(format!("{css}: {e}")));
        Ok(Self {
            row: parse("article.Box-row")?,
            name: parse("h2 a[href]")?,
            description: parse("p")?,
            language: parse(r#"[itemprop="programmingLanguage"]"#)?,
            stars: parse(r#"a[href$="/stargazers"]"#)?,
            forks: parse(r#"a[href$="/forks"]"#)?,
            today: parse("span.float-sm-right")?,
        })
    }
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(row: ElementRef, selector: &Selector) -> String {
    row.select(selector).next().map(element_text).unwrap_or_default()
}

/// Leading count of a cell such as `"1,234 stars today"`.
fn leading_count(text: &str) -> i64 {
    text.split_whitespace().next().map(parse_count).unwrap_or(0)
}

/// Parse every repository row of a trending page, in page order.
pub fn parse_page(html: &str, base_url: &str) -> Result<Vec<Option<CollectedItem>>, CollectError> {
    let selectors = RowSelectors::new()?;
    let document = Html::parse_document(html);

    let rows = document
        .select(&selectors.row)
        .map(|row| parse_row(row, &selectors, base_url))
        .collect();
    Ok(rows)
}

fn parse_row(row: ElementRef, s: &RowSelectors, base_url: &str) -> Option<CollectedItem> {
    let href = row.select(&s.name).next()?.value().attr("href")?;
    let full_name = href.trim().trim_matches('/').to_string();
    if full_name.split('/').count() != 2 {
        debug!(%href, "Skipping row without owner/name link");
        return None;
    }

    let description = truncate_chars(&first_text(row, &s.description), DESCRIPTION_CHARS);
    let stars = leading_count(&first_text(row, &s.stars));
    let forks = leading_count(&first_text(row, &s.forks));
    let stars_today = leading_count(&first_text(row, &s.today));

    Some(CollectedItem {
        id: ContentId::new(NAMESPACE, &full_name),
        source: NAME.to_string(),
        url: format!("{base_url}/{full_name}"),
        title: full_name,
        rank_signal: stars_today,
        secondary_signal: stars,
        timestamp: None,
        detail: ItemDetail::Repository {
            language: first_text(row, &s.language),
            description,
            stars_today,
            forks,
        },
    })
}

pub struct GitHubTrendingCollector {
    ctx: CollectorContext,
    base_url: String,
    since: String,
    languages: Vec<String>,
    language_limit: usize,
}

impl GitHubTrendingCollector {
    pub fn new(ctx: CollectorContext, settings: &GitHubTrendingSettings) -> Self {
        Self {
            ctx,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            since: settings.since.clone(),
            languages: settings.languages.clone(),
            language_limit: settings.language_limit,
        }
    }

    fn page_url(&self, language: &str) -> String {
        if language.is_empty() {
            format!("{}/trending?since={}", self.base_url, self.since)
        } else {
            format!(
                "{}/trending/{}?since={}",
                self.base_url,
                urlencoding::encode(language),
                self.since
            )
        }
    }

    #[instrument(level = "info", skip(self))]
    async fn collect_page(&self, language: &str, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.page_url(language);
        let html = self.ctx.get_text(&url, &self.ctx.page_headers()).await?;
        let rows = parse_page(&html, &self.base_url)?;

        let repos = self
            .ctx
            .take_unseen(rows.into_iter().take(limit * OVERFETCH_FACTOR), limit);
        info!(count = repos.len(), "Collected trending repositories");
        Ok(repos)
    }
}

#[async_trait]
impl Collector for GitHubTrendingCollector {
    fn name(&self) -> &str {
        NAME
    }

    async fn collect(&self, limit: usize) -> CollectorResult {
        let mut pages = vec![self.collect_page("", limit).await];
        for language in &self.languages {
            pages.push(self.collect_page(language, self.language_limit).await);
        }
        let cap = (limit + self.language_limit * self.languages.len()).min(DISPLAY_LIMIT);
        self.ctx.claim(merge_ranked(NAME, pages, cap))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }
        render_section(NAME, &result.items, |item| {
            let (language, description, stars_today, forks) = match &item.detail {
                ItemDetail::Repository {
                    language,
                    description,
                    stars_today,
                    forks,
                } => (language.as_str(), description.as_str(), *stars_today, *forks),
                _ => ("", "", 0, 0),
            };
            let today = if stars_today > 0 {
                format!(" (+{} today)", thousands(stars_today))
            } else {
                String::new()
            };
            Entry::new(
                format!("{}{}", bracketed(language), item.title),
                format!(
                    "Stars: {}{today} | Forks: {}",
                    thousands(item.secondary_signal),
                    thousands(forks)
                ),
            )
            .with_note(truncate_chars(description, NOTE_CHARS))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::{assert_seen_matches_rendered, context};
    use crate::fetch::testing::StubFetcher;

    const BASE: &str = "https://github.test";

    fn row(name: &str, language: &str, stars: &str, today: &str) -> String {
        format!(
            r#"<article class="Box-row">
  <div class="float-right"><a href="/login?return_to=/{name}">Star</a></div>
  <h2 class="h3 lh-condensed">
    <a href="/{name}" class="Link"><span class="text-normal">{owner} /</span> {repo}</a>
  </h2>
  <p class="col-9 color-fg-muted my-1 pr-4">
    A fast   {repo} written for testing.
  </p>
  <div class="f6 color-fg-muted mt-2">
    <span class="d-inline-block ml-0 mr-3"><span itemprop="programmingLanguage">{language}</span></span>
    <a href="/{name}/stargazers" class="Link--muted d-inline-block mr-3"><svg></svg> {stars}</a>
    <a href="/{name}/forks" class="Link--muted d-inline-block mr-3"><svg></svg> 1,024</a>
    <span class="d-inline-block float-sm-right"><svg></svg> {today} stars today</span>
  </div>
</article>"#,
            owner = name.split('/').next().unwrap(),
            repo = name.split('/').nth(1).unwrap(),
        )
    }

    fn page(rows: &[String]) -> String {
        format!("<html><body><main>{}</main></body></html>", rows.join("\n"))
    }

    fn collector(languages: &[&str], fetch: StubFetcher) -> GitHubTrendingCollector {
        let settings = GitHubTrendingSettings {
            base_url: BASE.to_string(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            language_limit: 1,
            ..GitHubTrendingSettings::default()
        };
        GitHubTrendingCollector::new(context(fetch), &settings)
    }

    #[test]
    fn test_parse_page() {
        let html = page(&[row("rust-lang/rust", "Rust", "101,234", "1,502")]);
        let rows = parse_page(&html, BASE).unwrap();
        assert_eq!(rows.len(), 1);

        let item = rows[0].as_ref().unwrap();
        assert_eq!(item.id.as_str(), "gh_rust-lang/rust");
        assert_eq!(item.url, "https://github.test/rust-lang/rust");
        assert_eq!(item.rank_signal, 1502);
        assert_eq!(item.secondary_signal, 101_234);
        assert_eq!(
            item.detail,
            ItemDetail::Repository {
                language: "Rust".to_string(),
                description: "A fast rust written for testing.".to_string(),
                stars_today: 1502,
                forks: 1024,
            }
        );
    }

    #[test]
    fn test_row_without_link_is_skipped() {
        let html = r#"<article class="Box-row"><h2>No link here</h2></article>"#;
        let rows = parse_page(html, BASE).unwrap();
        assert_eq!(rows, vec![None]);
    }

    #[tokio::test]
    async fn test_collect_ranks_by_stars_today_across_pages() {
        let all = page(&[
            row("a/slow", "Go", "500", "10"),
            row("b/fast", "Python", "9,000", "2.1k"),
        ]);
        let python = page(&[row("b/fast", "Python", "9,000", "2.1k"), row("c/snake", "Python", "80", "40")]);
        let fetch = StubFetcher::new()
            .with(&format!("{BASE}/trending?since=daily"), all)
            .with(&format!("{BASE}/trending/python?since=daily"), python);

        // the python page's single slot goes to b/fast, which the merge keeps once
        let result = collector(&["python"], fetch).collect(15).await;
        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["gh_b/fast", "gh_a/slow"]);
    }

    #[tokio::test]
    async fn test_format_for_analysis() {
        let fetch = StubFetcher::new().with(
            &format!("{BASE}/trending?since=daily"),
            page(&[row("rust-lang/rust", "Rust", "101,234", "1,502")]),
        );
        let c = collector(&[], fetch);
        let result = c.collect(15).await;
        let text = c.format_for_analysis(&result);
        assert!(text.contains(
            "1. [Rust] rust-lang/rust\n   Stars: 101,234 (+1,502 today) | Forks: 1,024\n   A fast rust written for testing.\n"
        ));
    }

    #[tokio::test]
    async fn test_overflowing_page_claims_only_rendered_repositories() {
        let rows: Vec<String> = (1..=25)
            .map(|n| row(&format!("owner/repo{n}"), "Rust", "1,000", &n.to_string()))
            .collect();
        let fetch = StubFetcher::new().with(&format!("{BASE}/trending?since=daily"), page(&rows));
        let ctx = context(fetch);
        let cache = ctx.cache.clone();
        let c = GitHubTrendingCollector::new(
            ctx,
            &GitHubTrendingSettings {
                base_url: BASE.to_string(),
                ..GitHubTrendingSettings::default()
            },
        );

        let result = c.collect(25).await;
        assert_eq!(result.len(), DISPLAY_LIMIT);
        let text = c.format_for_analysis(&result);
        assert_seen_matches_rendered(&cache, &result, &text);
        assert!(!cache.is_seen(&ContentId::new(NAMESPACE, "owner/repo1")));
    }
}

//! Report pages.
//!
//! Report bodies are CommonMark (plus `~~strikethrough~~`) rendered with
//! `pulldown-cmark`. Raw HTML is escaped and shown as text, `#` headings
//! render as `<h2>` under the page title, `•` bullets count as list items,
//! and only `http`/`https` links and images keep their markup.

use crate::report::{Report, timestamp};
use crate::utils::{collapse_whitespace, slugify};
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use regex::Regex;
use std::borrow::Cow;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

pub const REPORTS_DIR: &str = "reports";
const DESCRIPTION_CHARS: usize = 160;

static DOT_BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(\s*)•\s+").expect("static regex"));

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

/// Models like to write `• item`; make those list items.
fn normalize_bullets(markdown: &str) -> Cow<'_, str> {
    DOT_BULLET_RE.replace_all(markdown, "$1- ")
}

fn is_web_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Parser events with the page's restrictions applied.
fn page_events(markdown: &str) -> Vec<Event<'_>> {
    let mut out = Vec::new();
    // one entry per open link or image: whether its markup was dropped
    let mut dropped = Vec::new();

    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Html(raw) | Event::InlineHtml(raw) => out.push(Event::Text(raw)),
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                id,
                classes,
                attrs,
            }) => out.push(Event::Start(Tag::Heading {
                level: HeadingLevel::H2,
                id,
                classes,
                attrs,
            })),
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                out.push(Event::End(TagEnd::Heading(HeadingLevel::H2)))
            }
            Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. })) => {
                let url = match &tag {
                    Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => dest_url.as_ref(),
                    _ => "",
                };
                let keep = is_web_url(url);
                dropped.push(!keep);
                if keep {
                    out.push(Event::Start(tag));
                }
            }
            Event::End(end @ (TagEnd::Link | TagEnd::Image)) => {
                if !dropped.pop().unwrap_or(false) {
                    out.push(Event::End(end));
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Render a report body to HTML.
pub fn markdown_to_html(markdown: &str) -> String {
    let markdown = normalize_bullets(markdown);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, page_events(&markdown).into_iter());
    out.trim_end().to_string()
}

/// Plain-text summary of a body for listings and meta tags.
pub fn describe(body: &str) -> String {
    let body = normalize_bullets(body);
    let mut text = String::new();
    for event in Parser::new_ext(&body, options()) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock) => {
                text.push(' ')
            }
            _ => {}
        }
    }
    let text = collapse_whitespace(&text);

    if text.chars().count() > DESCRIPTION_CHARS {
        let cut: String = text.chars().take(DESCRIPTION_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    } else {
        text
    }
}

/// `2025-05-06-2130-general.html`
pub fn report_filename(local: &DateTime<FixedOffset>, category: &str) -> String {
    format!("{}-{}.html", local.format("%Y-%m-%d-%H%M"), slugify(category))
}

pub fn render_report_page(
    report: &Report,
    local: &DateTime<FixedOffset>,
    category: &str,
    description: &str,
    site_title: &str,
) -> String {
    let title = escape_html(&report.title);
    let keywords = if report.keywords.is_empty() {
        String::new()
    } else {
        let items: Vec<String> = report
            .keywords
            .iter()
            .map(|k| format!("<li>{}</li>", escape_html(k)))
            .collect();
        format!("<ul class=\"keywords\">{}</ul>\n", items.join(""))
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title} | {site}</title>
<meta name="description" content="{description}">
<meta name="keywords" content="{meta_keywords}">
</head>
<body>
<nav><a href="../index.html">{site}</a></nav>
<article>
<h1>{title}</h1>
<p class="meta"><time datetime="{iso}">{stamp}</time> · <span class="category">{category}</span></p>
{keywords}{body}
</article>
</body>
</html>
"#,
        site = escape_html(site_title),
        description = escape_html(description),
        meta_keywords = escape_html(&report.keywords.join(", ")),
        iso = local.to_rfc3339(),
        stamp = escape_html(&timestamp(local)),
        category = escape_html(category),
        body = markdown_to_html(&report.body),
    )
}

/// Write `reports/<filename>` under `docs_dir`.
#[instrument(level = "info", skip_all, fields(docs_dir = %docs_dir.display(), %filename))]
pub async fn write_report_page(
    docs_dir: &Path,
    filename: &str,
    html: &str,
) -> Result<(), Box<dyn Error>> {
    let reports_dir = docs_dir.join(REPORTS_DIR);
    fs::create_dir_all(&reports_dir).await?;
    let path = reports_dir.join(filename);
    fs::write(&path, html).await?;
    info!(path = %path.display(), "Wrote report page");
    Ok(())
}

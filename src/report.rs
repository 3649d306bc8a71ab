//! Report assembly: timestamps and splitting model output into title,
//! keywords and body.
//!
//! The model is asked to open its answer with two header lines:
//!
//! ```text
//! TITLE: Chip export rules dominate the week
//! KEYWORDS: semiconductors, export controls, AI
//!
//! ## World
//! - ...
//! ```
//!
//! Both lines are optional. Without a title the default header is used.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use std::iter::Peekable;
use std::str::Lines;

const TITLE_PREFIX: &str = "title:";
const KEYWORDS_PREFIX: &str = "keywords:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub title: String,
    pub keywords: Vec<String>,
    pub body: String,
}

impl Report {
    /// Raw mode: the corpus itself is the report.
    pub fn raw(corpus: &str, default_title: String) -> Self {
        Self {
            title: default_title,
            keywords: Vec::new(),
            body: corpus.trim().to_string(),
        }
    }
}

/// `now` shifted to a fixed offset of `offset_hours`.
///
/// Offsets outside +/-23 hours fall back to UTC.
pub fn local_time(now: DateTime<Utc>, offset_hours: i32) -> DateTime<FixedOffset> {
    let offset = offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset)
}

/// `UTC+9`, `UTC-5`, `UTC`.
pub fn offset_label(local: &DateTime<FixedOffset>) -> String {
    let seconds = local.offset().local_minus_utc();
    let hours = seconds / 3600;
    let minutes = (seconds.abs() % 3600) / 60;
    match (hours, minutes) {
        (0, 0) => "UTC".to_string(),
        (h, 0) => format!("UTC{h:+}"),
        (h, m) => format!("UTC{h:+}:{m:02}"),
    }
}

/// `2025-05-06 21:30 (UTC+9)`
pub fn timestamp(local: &DateTime<FixedOffset>) -> String {
    format!("{} ({})", local.format("%Y-%m-%d %H:%M"), offset_label(local))
}

pub fn default_title(local: &DateTime<FixedOffset>) -> String {
    format!("Trend Report | {}", timestamp(local))
}

/// Strip `prefix` case-insensitively, returning the trimmed remainder.
fn strip_label<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let line = line.trim().trim_start_matches('#').trim_start();
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| line[prefix.len()..].trim())
}

/// Comma separated, trimmed, empties dropped, first occurrence kept.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !keywords.iter().any(|k| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }
    keywords
}

fn skip_blank(lines: &mut Peekable<Lines<'_>>) {
    while lines.peek().is_some_and(|l| l.trim().is_empty()) {
        lines.next();
    }
}

/// Split model output into a [`Report`].
pub fn split_report(text: &str, default_title: String) -> Report {
    let mut lines = text.lines().peekable();

    skip_blank(&mut lines);
    let title = match lines.peek().copied().and_then(|l| strip_label(l, TITLE_PREFIX)) {
        Some(title) => {
            lines.next();
            Some(title.to_string()).filter(|t| !t.is_empty())
        }
        None => None,
    };

    let mut keywords = Vec::new();
    if title.is_some() {
        skip_blank(&mut lines);
        if let Some(raw) = lines.peek().copied().and_then(|l| strip_label(l, KEYWORDS_PREFIX)) {
            keywords = parse_keywords(raw);
            lines.next();
        }
    }

    let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    Report {
        title: title.unwrap_or(default_title),
        keywords,
        body,
    }
}

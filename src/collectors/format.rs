//! Text rendering shared by the collectors' `format_for_analysis`.
//!
//! A non-empty result renders as
//!
//! ```text
//!
//! ## Hacker News
//!
//! 1. Some title
//!    Score: 120 | Comments: 45
//!    URL: https://example.com/story
//! ```
//!
//! and an empty one as the sentinel `"[Hacker News] no new items\n"`, so the
//! orchestrator can tell a silent source from one that never ran.

use crate::models::CollectedItem;

/// Marker text of the empty-result sentinel.
pub const NO_NEW_ITEMS: &str = "no new items";

pub fn sentinel(name: &str) -> String {
    format!("[{name}] {NO_NEW_ITEMS}\n")
}

/// Whether a rendered block is the empty-result sentinel.
pub fn is_sentinel(text: &str) -> bool {
    let text = text.trim();
    text.starts_with('[') && text.ends_with(NO_NEW_ITEMS)
}

/// One rendered list entry.
#[derive(Debug, Default)]
pub struct Entry {
    pub title: String,
    pub signals: String,
    /// Extra indented line (excerpt, description), if any.
    pub note: Option<String>,
}

impl Entry {
    pub fn new(title: impl Into<String>, signals: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            signals: signals.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        if !note.trim().is_empty() {
            self.note = Some(note);
        }
        self
    }
}

/// Render a heading and one numbered entry per item.
///
/// Collectors cap their results before claiming them, so every item passed
/// in is rendered.
pub fn render_section<'a, I, F>(heading: &str, items: I, entry: F) -> String
where
    I: IntoIterator<Item = &'a CollectedItem>,
    F: Fn(&CollectedItem) -> Entry,
{
    let mut out = format!("\n## {heading}\n\n");
    for (i, item) in items.into_iter().enumerate() {
        let e = entry(item);
        out.push_str(&format!("{}. {}\n", i + 1, e.title));
        if !e.signals.is_empty() {
            out.push_str(&format!("   {}\n", e.signals));
        }
        if let Some(note) = e.note {
            out.push_str(&format!("   {}\n", note));
        }
        out.push_str(&format!("   URL: {}\n", item.url));
    }
    out
}

/// `"[label] "` or nothing when the label is empty.
pub fn bracketed(label: &str) -> String {
    if label.is_empty() {
        String::new()
    } else {
        format!("[{label}] ")
    }
}

/// Group thousands with commas (`1234567` -> `"1,234,567"`).
pub fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 { format!("-{out}") } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_item;

    #[test]
    fn test_sentinel_round_trip() {
        let s = sentinel("Hacker News");
        assert_eq!(s, "[Hacker News] no new items\n");
        assert!(is_sentinel(&s));
        assert!(!is_sentinel("\n## Hacker News\n\n1. x\n"));
        assert!(!s.is_empty());
    }

    #[test]
    fn test_render_section_numbers_every_item() {
        let items = vec![
            sample_item("hn", "1", 3),
            sample_item("hn", "2", 2),
            sample_item("hn", "3", 1),
        ];
        let text = render_section("Hacker News", &items, |item| {
            Entry::new(item.title.clone(), format!("Score: {}", item.rank_signal)).with_note("")
        });
        assert!(text.starts_with("\n## Hacker News\n\n1. Item 1\n   Score: 3\n   URL: https://example.com/1\n"));
        assert!(text.contains("2. Item 2\n"));
        assert!(text.ends_with("3. Item 3\n   Score: 1\n   URL: https://example.com/3\n"));
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1234), "1,234");
        assert_eq!(thousands(1234567), "1,234,567");
        assert_eq!(thousands(-1000), "-1,000");
    }

    #[test]
    fn test_bracketed() {
        assert_eq!(bracketed(""), "");
        assert_eq!(bracketed("Rust"), "[Rust] ");
    }
}

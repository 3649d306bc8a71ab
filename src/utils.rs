//! Small helpers shared by the collectors and the report outputs.
//!
//! - Count normalization for scraped listing pages (`"1,234"`, `"1.2k"`)
//! - Char-boundary safe truncation for logs and rendered excerpts
//! - Markup stripping and whitespace collapsing for summaries
//! - File name slugs and file system validation for output directories

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Normalize a scraped count into an integer.
///
/// Listing pages render counts as `"1,234"`, `"1.2k"` or `"3M"`. Thousands
/// separators are dropped and a `k`/`m` suffix scales a decimal mantissa.
/// Anything that still does not parse yields `0`; this never fails.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_count("1,234"), 1234);
/// assert_eq!(parse_count("1.2k"), 1200);
/// assert_eq!(parse_count("N/A"), 0);
/// ```
pub fn parse_count(text: &str) -> i64 {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return 0;
    }

    let lower = cleaned.to_lowercase();
    let (mantissa, scale) = if let Some(m) = lower.strip_suffix('k') {
        (m, 1_000.0)
    } else if let Some(m) = lower.strip_suffix('m') {
        (m, 1_000_000.0)
    } else {
        return lower.parse::<i64>().unwrap_or(0);
    };

    match mantissa.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => (v * scale).round() as i64,
        _ => 0,
    }
}

/// Extract the first run of digits in `text` as a count (`"[12]"` -> 12).
pub fn first_number(text: &str) -> i64 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (moved back to a char boundary) and
/// suffixed with an ellipsis and the number of dropped bytes.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Remove markup tags and collapse runs of whitespace into single spaces.
pub fn strip_tags(s: &str) -> String {
    let without = TAG_RE.replace_all(s, " ");
    collapse_whitespace(&without)
}

/// Collapse every whitespace run into one space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    SPACE_RE.replace_all(s, " ").trim().to_string()
}

/// A lowercase, hyphenated, file-name-safe string; `general` when nothing
/// usable is left.
///
/// ```ignore
/// assert_eq!(slugify("Dev & AI"), "dev-ai");
/// ```
pub fn slugify(text: &str) -> String {
    let slug = text
        .to_lowercase()
        .replace(|c: char| !c.is_ascii_alphanumeric() && c != ' ' && c != '-', "")
        .split(|c: char| c == ' ' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "general".to_string()
    } else {
        slug
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and deletes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count_formats() {
        assert_eq!(parse_count("1,234"), 1234);
        assert_eq!(parse_count("1.2k"), 1200);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("N/A"), 0);
    }

    #[test]
    fn test_parse_count_suffixes_and_noise() {
        assert_eq!(parse_count("  42 "), 42);
        assert_eq!(parse_count("3K"), 3000);
        assert_eq!(parse_count("2.5M"), 2_500_000);
        assert_eq!(parse_count("-7"), -7);
        assert_eq!(parse_count("k"), 0);
        assert_eq!(parse_count("12 views"), 0);
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("[12]"), 12);
        assert_eq!(first_number("댓글 345개"), 345);
        assert_eq!(first_number("none"), 0);
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte_boundary() {
        // each Hangul syllable is 3 bytes; byte 4 is mid-character
        let result = truncate_for_log("한국어", 4);
        assert!(result.starts_with("한"));
        assert!(result.contains("(+6 bytes)"));
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(
            strip_tags("<p>Hello <b>bold</b>\n\n world</p>"),
            "Hello bold world"
        );
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("뉴스속보", 2), "뉴스");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Dev & AI"), "dev-ai");
        assert_eq!(slugify("market"), "market");
        assert_eq!(slugify("../../etc"), "etc");
        assert_eq!(slugify("시장"), "general");
    }
}

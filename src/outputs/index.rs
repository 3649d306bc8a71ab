//! Site index: `reports.json` and the `index.html` generated from it.
//!
//! `reports.json` lists published reports newest first. Publishing the same
//! file name again replaces its entry instead of adding a second one.

use super::page::{REPORTS_DIR, escape_html};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

pub const REPORTS_JSON: &str = "reports.json";
pub const INDEX_HTML: &str = "index.html";
pub const MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub title: String,
    pub filename: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    #[serde(default)]
    pub time: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Insert `entry`, dropping any entry with the same file name, and keep the
/// list newest first and at most [`MAX_ENTRIES`] long.
pub fn upsert(entries: &mut Vec<ReportEntry>, entry: ReportEntry) {
    entries.retain(|e| e.filename != entry.filename);
    entries.insert(0, entry);
    entries.sort_by(|a, b| (&b.date, &b.time).cmp(&(&a.date, &a.time)));
    entries.truncate(MAX_ENTRIES);
}

/// Read `reports.json`; missing or unreadable files give an empty list.
pub async fn load_entries(path: &Path) -> Vec<ReportEntry> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read report index; starting fresh");
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt report index; starting fresh");
            Vec::new()
        }
    }
}

pub fn render_index(entries: &[ReportEntry], site_title: &str) -> String {
    let site = escape_html(site_title);
    let items = if entries.is_empty() {
        "<p>No reports yet.</p>".to_string()
    } else {
        let rows: Vec<String> = entries
            .iter()
            .map(|e| {
                format!(
                    "<li data-category=\"{category}\"><a href=\"{dir}/{file}\">{title}</a> \
                     <time>{date} {time}</time><p>{description}</p></li>",
                    category = escape_html(&e.category),
                    dir = REPORTS_DIR,
                    file = escape_html(&e.filename),
                    title = escape_html(&e.title),
                    date = escape_html(&e.date),
                    time = escape_html(&e.time),
                    description = escape_html(&e.description),
                )
            })
            .collect();
        format!("<ul class=\"reports\">\n{}\n</ul>", rows.join("\n"))
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{site}</title>
</head>
<body>
<h1>{site}</h1>
{items}
</body>
</html>
"#
    )
}

/// Add `entry` to `reports.json` and regenerate `index.html`.
#[instrument(level = "info", skip_all, fields(docs_dir = %docs_dir.display(), filename = %entry.filename))]
pub async fn update_index(
    docs_dir: &Path,
    entry: ReportEntry,
    site_title: &str,
) -> Result<Vec<ReportEntry>, Box<dyn Error>> {
    let json_path = docs_dir.join(REPORTS_JSON);
    let mut entries = load_entries(&json_path).await;
    upsert(&mut entries, entry);

    fs::write(&json_path, serde_json::to_string_pretty(&entries)?).await?;
    fs::write(docs_dir.join(INDEX_HTML), render_index(&entries, site_title)).await?;
    info!(entries = entries.len(), "Updated report index");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str, date: &str, time: &str) -> ReportEntry {
        ReportEntry {
            title: format!("Report {filename}"),
            filename: filename.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            category: "general".to_string(),
            description: String::new(),
            keywords: Vec::new(),
        }
    }

    #[test]
    fn test_upsert_keeps_newest_first() {
        let mut entries = vec![entry("b.html", "2025-05-06", "09:00")];
        upsert(&mut entries, entry("a.html", "2025-05-05", "21:00"));
        upsert(&mut entries, entry("c.html", "2025-05-06", "21:00"));
        let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["c.html", "b.html", "a.html"]);
    }

    #[test]
    fn test_upsert_replaces_same_filename() {
        let mut entries = vec![entry("a.html", "2025-05-06", "09:00")];
        let mut again = entry("a.html", "2025-05-06", "09:00");
        again.title = "Updated".to_string();
        upsert(&mut entries, again);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Updated");
    }

    #[test]
    fn test_upsert_caps_length() {
        let mut entries = Vec::new();
        for i in 0..(MAX_ENTRIES + 5) {
            upsert(&mut entries, entry(&format!("{i:03}.html"), "2025-05-06", &format!("{:02}:{:02}", i / 60, i % 60)));
        }
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].filename, format!("{:03}.html", MAX_ENTRIES + 4));
    }

    #[test]
    fn test_render_index_escapes() {
        let mut e = entry("a.html", "2025-05-06", "09:00");
        e.title = "<b>x</b>".to_string();
        let html = render_index(&[e], "Trend Reporter");
        assert!(html.contains("<a href=\"reports/a.html\">&lt;b&gt;x&lt;/b&gt;</a>"));
        assert!(render_index(&[], "Trend Reporter").contains("No reports yet."));
    }

    #[tokio::test]
    async fn test_update_index_round_trip_and_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(REPORTS_JSON), "not json").unwrap();

        update_index(dir.path(), entry("a.html", "2025-05-06", "09:00"), "Site")
            .await
            .unwrap();
        let entries = update_index(dir.path(), entry("b.html", "2025-05-06", "21:00"), "Site")
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);

        let on_disk = load_entries(&dir.path().join(REPORTS_JSON)).await;
        assert_eq!(on_disk, entries);
        assert_eq!(on_disk[0].filename, "b.html");

        let index = std::fs::read_to_string(dir.path().join(INDEX_HTML)).unwrap();
        assert!(index.contains("reports/b.html"));
        assert!(index.contains("reports/a.html"));
    }
}

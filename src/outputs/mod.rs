//! Static site output.
//!
//! ```text
//! docs_dir/
//! ├── index.html                          # generated from reports.json
//! ├── reports.json                        # newest first
//! └── reports/
//!     ├── 2025-05-06-0900-general.html
//!     └── 2025-05-06-2130-dev.html
//! ```

pub mod index;
pub mod page;

use crate::report::Report;
use chrono::{DateTime, FixedOffset};
use index::ReportEntry;
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument};

/// Write the report page and update the index. Returns the page file name.
#[instrument(level = "info", skip_all, fields(docs_dir = %docs_dir.display(), %category))]
pub async fn publish(
    docs_dir: &Path,
    report: &Report,
    local: &DateTime<FixedOffset>,
    category: &str,
    site_title: &str,
) -> Result<String, Box<dyn Error>> {
    let filename = page::report_filename(local, category);
    let description = page::describe(&report.body);

    let html = page::render_report_page(report, local, category, &description, site_title);
    page::write_report_page(docs_dir, &filename, &html).await?;

    let entry = ReportEntry {
        title: report.title.clone(),
        filename: filename.clone(),
        date: local.format("%Y-%m-%d").to_string(),
        time: local.format("%H:%M").to_string(),
        category: category.to_string(),
        description,
        keywords: report.keywords.clone(),
    };
    index::update_index(docs_dir, entry, site_title).await?;

    info!(%filename, "Published report");
    Ok(filename)
}

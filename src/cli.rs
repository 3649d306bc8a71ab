//! Command-line interface definitions for Trend Reporter.
//!
//! Flags override the matching `report` settings of the YAML config.

use clap::Parser;
use std::path::PathBuf;

/// Collect trending items, skip what earlier runs already reported, and
/// publish a trend report.
///
/// # Examples
///
/// ```sh
/// # Scheduled run with the default config
/// trend_reporter
///
/// # Post the collected items without the model call
/// trend_reporter --raw --category dev
///
/// # See what would be collected, without touching the cache or the site
/// trend_reporter --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the sources config
    #[arg(short, long, default_value = "config/sources.yaml")]
    pub config: PathBuf,

    /// Output directory for the static site (overrides `report.docs_dir`)
    #[arg(short, long)]
    pub docs_dir: Option<PathBuf>,

    /// Path to the awful_aj config.yaml (defaults to awful_aj's config dir)
    #[arg(long)]
    pub aj_config: Option<PathBuf>,

    /// Discord webhook URL (overrides `report.webhook_url`)
    #[arg(long, env = "DISCORD_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Report the collected items as-is, without the model
    #[arg(long)]
    pub raw: bool,

    /// Collect and print the corpus; do not update the cache, notify or publish
    #[arg(long)]
    pub dry_run: bool,

    /// Report category used in file names and the index (overrides `report.category`)
    #[arg(long)]
    pub category: Option<String>,
}

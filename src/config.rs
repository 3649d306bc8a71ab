//! YAML configuration for sources, cache, HTTP and reporting.
//!
//! Every section and field has a default, so a partial `sources.yaml` (or
//! none at all) is a valid configuration. Collector behavior depends only on
//! the plain numbers and strings below, never on the file format.
//!
//! ```yaml
//! hackernews:
//!   top_stories: 20
//!   best_stories: 10
//! rss:
//!   items_per_feed: 8
//!   feeds:
//!     - name: Ars Technica
//!       url: https://feeds.arstechnica.com/arstechnica/index
//!       category: tech
//! ```

use crate::cache::{CACHE_FILE_NAME, CleanupPolicy};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config value {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheSettings,
    pub http: HttpSettings,
    pub run: RunSettings,
    pub hackernews: HackerNewsSettings,
    pub lobsters: LobstersSettings,
    pub devto: DevToSettings,
    pub huggingface: HuggingFaceSettings,
    pub reddit: RedditSettings,
    pub rss: RssSettings,
    pub github_trending: GitHubTrendingSettings,
    pub boards: BoardsSettings,
    pub fivech: FiveChSettings,
    pub report: ReportSettings,
}

impl Config {
    /// Parse and validate a YAML document; `path` is only used in errors.
    pub fn from_yaml(raw: &str, path: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.cache.policy()?;
        Ok(config)
    }

    /// Load `path`; a missing file yields the defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let config = Self::from_yaml(&raw, &display)?;
                info!("Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file not found; using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: display,
                source,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub max_size: usize,
    pub min_cleanup_interval_hours: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache"),
            max_size: 10_000,
            min_cleanup_interval_hours: 24,
        }
    }
}

impl CacheSettings {
    /// The seen-set cleanup policy; the interval must be a non-negative
    /// number of hours that fits a duration.
    pub fn policy(&self) -> Result<CleanupPolicy, ConfigError> {
        let hours = self.min_cleanup_interval_hours;
        let min_interval = Duration::try_hours(hours)
            .filter(|interval| *interval >= Duration::zero())
            .ok_or_else(|| ConfigError::Invalid {
                field: "cache.min_cleanup_interval_hours",
                message: format!("{hours} is not a usable number of hours"),
            })?;
        Ok(CleanupPolicy {
            max_size: self.max_size,
            min_interval,
        })
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE_NAME)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Client identifier sent to API sources.
    pub user_agent: String,
    /// Identifier sent to community boards that reject non-browser clients.
    pub browser_user_agent: String,
    /// Retries for transient failures (network, 5xx, 429).
    pub max_retries: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: format!("trend_reporter/{}", env!("CARGO_PKG_VERSION")),
            browser_user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunSettings {
    /// Collectors running at the same time.
    pub concurrency: usize,
    /// Merged text shorter than this counts as "nothing new".
    pub min_corpus_chars: usize,
    /// Offset used for report timestamps and file names.
    pub utc_offset_hours: i32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            min_corpus_chars: 200,
            utc_offset_hours: 9,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HackerNewsSettings {
    pub enabled: bool,
    pub base_url: String,
    pub top_stories: usize,
    pub best_stories: usize,
}

impl Default for HackerNewsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://hacker-news.firebaseio.com/v0".to_string(),
            top_stories: 20,
            best_stories: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LobstersSettings {
    pub enabled: bool,
    pub base_url: String,
    pub hottest: usize,
    pub newest: usize,
}

impl Default for LobstersSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://lobste.rs".to_string(),
            hottest: 25,
            newest: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevToSettings {
    pub enabled: bool,
    pub base_url: String,
    pub general: usize,
    pub tags: Vec<String>,
    pub tag_limit: usize,
    /// `day`, `week`, `month`, `year` or `infinity`.
    pub top: String,
}

impl Default for DevToSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://dev.to/api".to_string(),
            general: 20,
            tags: Vec::new(),
            tag_limit: 10,
            top: "week".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HuggingFaceSettings {
    pub enabled: bool,
    pub base_url: String,
    pub trending: usize,
    pub recent: usize,
    /// Recently modified models below this download count are skipped.
    pub recent_min_downloads: i64,
}

impl Default for HuggingFaceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://huggingface.co/api".to_string(),
            trending: 10,
            recent: 5,
            recent_min_downloads: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedditSettings {
    pub enabled: bool,
    pub base_url: String,
    pub subreddits: Vec<String>,
    pub posts_per_subreddit: usize,
    /// `hot`, `top` (of the day) or `new`.
    pub sort: String,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://www.reddit.com".to_string(),
            subreddits: Vec::new(),
            posts_per_subreddit: 15,
            sort: "hot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
    #[serde(default = "default_feed_category")]
    pub category: String,
}

fn default_feed_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RssSettings {
    pub enabled: bool,
    pub items_per_feed: usize,
    pub feeds: Vec<FeedSpec>,
}

impl Default for RssSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            items_per_feed: 8,
            feeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubTrendingSettings {
    pub enabled: bool,
    pub base_url: String,
    pub limit: usize,
    /// `daily`, `weekly` or `monthly`.
    pub since: String,
    pub languages: Vec<String>,
    pub language_limit: usize,
}

impl Default for GitHubTrendingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://github.com".to_string(),
            limit: 15,
            since: "daily".to_string(),
            languages: vec!["python".to_string(), "typescript".to_string()],
            language_limit: 5,
        }
    }
}

/// One listing page on a community site.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BoardSpec {
    /// Short tag used in identifiers (`dc_{tag}_{post}`).
    pub tag: String,
    /// Display name.
    pub name: String,
    /// Path appended to the site's base URL.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BoardSiteSettings {
    pub enabled: bool,
    pub limit: usize,
    /// Overrides the site's built-in board list when non-empty.
    pub boards: Vec<BoardSpec>,
}

impl Default for BoardSiteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 20,
            boards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BoardsSettings {
    pub dcinside: BoardSiteSettings,
    pub clien: BoardSiteSettings,
    pub fmkorea: BoardSiteSettings,
    pub ruliweb: BoardSiteSettings,
    pub ppomppu: BoardSiteSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FiveChSettings {
    pub enabled: bool,
    pub url: String,
    pub limit: usize,
}

impl Default for FiveChSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://headline.5ch.net/bbynews/".to_string(),
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportSettings {
    pub docs_dir: PathBuf,
    pub category: String,
    /// awful_aj chat template used for the analysis call.
    pub template: String,
    pub webhook_url: Option<String>,
    pub site_title: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            category: "general".to_string(),
            template: "trend_report".to_string(),
            webhook_url: None,
            site_title: "Trend Reporter".to_string(),
        }
    }
}

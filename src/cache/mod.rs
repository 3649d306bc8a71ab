//! Persistent "already reported" set.
//!
//! Every collector consults the same [`SeenCache`] before accepting an item,
//! so an item reported in one run is suppressed in every later run. The set
//! is loaded once at process start, mutated in memory while collectors run,
//! and written back exactly once at the end of the run.
//!
//! # File Format
//!
//! ```text
//! {"ids": ["hn_4211", "gh_rust-lang/rust", ...], "last_cleanup": "2025-05-06T08:00:00Z"}
//! ```
//!
//! `ids` is stored oldest first, so the array order doubles as the insertion
//! order needed for size-based eviction.
//!
//! # Failure Semantics
//!
//! The cache is a freshness optimization. A missing, unreadable or corrupt
//! file yields an empty set and the run continues.

pub mod lock;

use crate::models::ContentId;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// File name of the persisted set inside the cache directory.
pub const CACHE_FILE_NAME: &str = "seen_content.json";

/// When and how far the set is pruned.
#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    /// Cardinality above which the set is cut down to `max_size / 2`.
    pub max_size: usize,
    /// Minimum time between two cleanups.
    pub min_interval: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            min_interval: Duration::days(1),
        }
    }
}

/// Insertion-ordered set of content identifiers.
#[derive(Debug, Clone)]
pub struct SeenSet {
    ids: HashSet<ContentId>,
    order: VecDeque<ContentId>,
    last_cleanup: DateTime<Utc>,
}

#[derive(Serialize)]
struct CacheFileOut<'a> {
    ids: Vec<&'a str>,
    last_cleanup: String,
}

#[derive(Deserialize)]
struct CacheFileIn {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default, alias = "lastCleanup")]
    last_cleanup: Option<String>,
}

impl SeenSet {
    pub fn new(last_cleanup: DateTime<Utc>) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            last_cleanup,
        }
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.ids.contains(id)
    }

    /// Insert `id`; returns `false` if it was already present.
    ///
    /// Re-inserting an id does not refresh its position in the recency order.
    pub fn insert(&mut self, id: ContentId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn last_cleanup(&self) -> DateTime<Utc> {
        self.last_cleanup
    }

    /// Identifiers from oldest to newest insertion.
    pub fn iter(&self) -> impl Iterator<Item = &ContentId> {
        self.order.iter()
    }

    /// Size-based pruning, gated by the policy's minimum interval.
    ///
    /// When the gate is open the set is truncated to the `max_size / 2` most
    /// recently inserted entries (only if it exceeds `max_size`) and
    /// `last_cleanup` moves to `now`. Returns whether anything was evicted.
    pub fn cleanup(&mut self, policy: &CleanupPolicy, now: DateTime<Utc>) -> bool {
        if now - self.last_cleanup <= policy.min_interval {
            return false;
        }

        let mut pruned = false;
        if self.order.len() > policy.max_size {
            let keep = policy.max_size / 2;
            let evict = self.order.len() - keep;
            for id in self.order.drain(..evict) {
                self.ids.remove(&id);
            }
            pruned = true;
        }
        self.last_cleanup = now;
        pruned
    }

    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&CacheFileOut {
            ids: self.iter().map(ContentId::as_str).collect(),
            last_cleanup: self.last_cleanup.to_rfc3339(),
        })
    }

    fn from_json(raw: &str, now: DateTime<Utc>) -> serde_json::Result<Self> {
        let file: CacheFileIn = serde_json::from_str(raw)?;
        let last_cleanup = file
            .last_cleanup
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);

        let mut set = SeenSet::new(last_cleanup);
        for id in file.ids {
            set.insert(ContentId::from_raw(id));
        }
        Ok(set)
    }
}

/// Accept RFC 3339 timestamps and naive ISO 8601 ones (read as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Shared handle to the seen-set used by every collector during one run.
///
/// All reads and writes go through one mutex; it is never held across an
/// `.await`.
#[derive(Debug)]
pub struct SeenCache {
    path: PathBuf,
    policy: CleanupPolicy,
    inner: Mutex<SeenSet>,
}

impl SeenCache {
    pub fn new(path: impl Into<PathBuf>, policy: CleanupPolicy, set: SeenSet) -> Self {
        Self {
            path: path.into(),
            policy,
            inner: Mutex::new(set),
        }
    }

    /// Load the set from `path`, falling back to an empty set on any error.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>, policy: CleanupPolicy) -> Self {
        let path = path.as_ref().to_path_buf();
        let now = Utc::now();

        let set = match fs::read_to_string(&path).await {
            Ok(raw) => match SeenSet::from_json(&raw, now) {
                Ok(set) => {
                    info!(count = set.len(), last_cleanup = %set.last_cleanup(), "Loaded seen-set");
                    set
                }
                Err(e) => {
                    warn!(error = %e, "Seen-set file is corrupt; starting with an empty set");
                    SeenSet::new(now)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No seen-set file yet; starting with an empty set");
                SeenSet::new(now)
            }
            Err(e) => {
                warn!(error = %e, "Seen-set file is unreadable; starting with an empty set");
                SeenSet::new(now)
            }
        };

        Self::new(path, policy, set)
    }

    fn lock(&self) -> MutexGuard<'_, SeenSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_seen(&self, id: &ContentId) -> bool {
        self.lock().contains(id)
    }

    /// Idempotent insert.
    #[cfg(test)]
    pub fn mark_seen(&self, id: ContentId) {
        self.lock().insert(id);
    }

    /// Check and mark in one step.
    ///
    /// Returns `true` when `id` was unseen and has now been recorded, i.e.
    /// the caller may report the item.
    pub fn claim(&self, id: &ContentId) -> bool {
        self.lock().insert(id.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clone of the current set, for inspection.
    #[cfg(test)]
    pub fn snapshot(&self) -> SeenSet {
        self.lock().clone()
    }

    /// Clean up, then write the set atomically (temp file + rename).
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn persist(&self) -> io::Result<()> {
        let payload = {
            let mut set = self.lock();
            if set.cleanup(&self.policy, Utc::now()) {
                info!(remaining = set.len(), "Pruned seen-set");
            }
            set.to_json()?
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp = tmp_path(&self.path);
        fs::write(&tmp, payload.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(bytes = payload.len(), "Wrote seen-set");
        Ok(())
    }
}

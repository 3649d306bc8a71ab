//! Runs every enabled collector and assembles the analysis corpus.
//!
//! Collectors run concurrently, bounded by `concurrency`, through an
//! order-preserving buffered stream: the corpus always lists sources in
//! configured order no matter which one answers first. Each collector runs
//! in its own task so a panic is contained and tallied as a failure.
//!
//! After the last collector finishes the shared seen-set is persisted once.

use crate::cache::SeenCache;
use crate::collectors::boards::{self, BoardCollector};
use crate::collectors::devto::DevToCollector;
use crate::collectors::fivech::FiveChCollector;
use crate::collectors::format::{is_sentinel, sentinel};
use crate::collectors::github_trending::GitHubTrendingCollector;
use crate::collectors::hackernews::HackerNewsCollector;
use crate::collectors::huggingface::HuggingFaceCollector;
use crate::collectors::lobsters::LobstersCollector;
use crate::collectors::reddit::RedditCollector;
use crate::collectors::rss::RssCollector;
use crate::collectors::{Collector, CollectorContext};
use crate::config::Config;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// One collector and the number of new items it is asked for.
#[derive(Clone)]
pub struct CollectorSlot {
    pub collector: Arc<dyn Collector>,
    pub limit: usize,
}

impl CollectorSlot {
    pub fn new(collector: Arc<dyn Collector>, limit: usize) -> Self {
        Self { collector, limit }
    }
}

/// Slots for every enabled source, in report order.
///
/// RSS and Reddit without any configured feed or subreddit are skipped.
pub fn slots_from_config(config: &Config, ctx: &CollectorContext) -> Vec<CollectorSlot> {
    let mut slots = Vec::new();
    let mut push = |collector: Arc<dyn Collector>, limit: usize| {
        slots.push(CollectorSlot::new(collector, limit));
    };

    if config.hackernews.enabled {
        let c = HackerNewsCollector::new(ctx.clone(), &config.hackernews);
        push(Arc::new(c), config.hackernews.top_stories);
    }
    if config.lobsters.enabled {
        let c = LobstersCollector::new(ctx.clone(), &config.lobsters);
        push(Arc::new(c), config.lobsters.hottest);
    }
    if config.devto.enabled {
        let c = DevToCollector::new(ctx.clone(), &config.devto);
        push(Arc::new(c), config.devto.general);
    }
    if config.huggingface.enabled {
        let c = HuggingFaceCollector::new(ctx.clone(), &config.huggingface);
        push(Arc::new(c), config.huggingface.trending);
    }
    if config.reddit.enabled && !config.reddit.subreddits.is_empty() {
        let c = RedditCollector::new(ctx.clone(), &config.reddit);
        push(Arc::new(c), config.reddit.posts_per_subreddit);
    }
    if config.rss.enabled && !config.rss.feeds.is_empty() {
        let c = RssCollector::new(ctx.clone(), &config.rss);
        push(Arc::new(c), config.rss.items_per_feed);
    }
    if config.github_trending.enabled {
        let c = GitHubTrendingCollector::new(ctx.clone(), &config.github_trending);
        push(Arc::new(c), config.github_trending.limit);
    }

    let sites = [
        (&boards::DCINSIDE, &config.boards.dcinside),
        (&boards::CLIEN, &config.boards.clien),
        (&boards::FMKOREA, &config.boards.fmkorea),
        (&boards::RULIWEB, &config.boards.ruliweb),
        (&boards::PPOMPPU, &config.boards.ppomppu),
    ];
    for (layout, settings) in sites {
        if settings.enabled {
            let c = BoardCollector::new(ctx.clone(), layout, settings);
            push(Arc::new(c), settings.limit);
        }
    }

    if config.fivech.enabled {
        let c = FiveChCollector::new(ctx.clone(), &config.fivech);
        push(Arc::new(c), config.fivech.limit);
    }

    slots
}

/// Per-source tally of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub name: String,
    pub items: usize,
    /// Set when the whole source failed (or its task panicked).
    pub error: Option<String>,
    /// Whether the source rendered the "no new items" sentinel.
    pub sentinel: bool,
}

impl SourceOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything the report pipeline needs from a collection run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub corpus: String,
    pub outcomes: Vec<SourceOutcome>,
    pub persist_error: Option<String>,
}

/// Thresholds used to decide whether a run is worth reporting.
#[derive(Debug, Clone)]
pub struct EmptinessPolicy {
    pub min_corpus_chars: usize,
}

impl Default for EmptinessPolicy {
    fn default() -> Self {
        Self {
            min_corpus_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// There is something new to analyze.
    Fresh,
    /// Every source answered but (almost) nothing was new.
    NothingNew,
    /// Every source failed.
    AllSourcesFailed,
}

impl RunSummary {
    pub fn total_items(&self) -> usize {
        self.outcomes.iter().map(|o| o.items).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed()).count()
    }

    pub fn classify(&self, policy: &EmptinessPolicy) -> RunOutcome {
        if !self.outcomes.is_empty() && self.failed_sources() == self.outcomes.len() {
            return RunOutcome::AllSourcesFailed;
        }

        let sentinels = self.outcomes.iter().filter(|o| o.sentinel).count();
        if self.total_items() == 0
            || self.corpus.trim().chars().count() < policy.min_corpus_chars
            || sentinels * 2 > self.outcomes.len()
        {
            return RunOutcome::NothingNew;
        }

        RunOutcome::Fresh
    }
}

pub struct Orchestrator {
    slots: Vec<CollectorSlot>,
    cache: Arc<SeenCache>,
    concurrency: usize,
    persist: bool,
}

impl Orchestrator {
    pub fn new(slots: Vec<CollectorSlot>, cache: Arc<SeenCache>, concurrency: usize) -> Self {
        Self {
            slots,
            cache,
            concurrency: concurrency.max(1),
            persist: true,
        }
    }

    /// Skip writing the seen-set back (dry runs).
    pub fn without_persist(mut self) -> Self {
        self.persist = false;
        self
    }

    #[instrument(level = "info", skip_all, fields(sources = self.slots.len(), concurrency = self.concurrency))]
    pub async fn run_all(&self) -> RunSummary {
        let t0 = Instant::now();

        let results: Vec<(SourceOutcome, String)> = stream::iter(self.slots.iter().cloned())
            .map(|slot| async move {
                let name = slot.collector.name().to_string();
                let task = tokio::spawn(async move {
                    let result = slot.collector.collect(slot.limit).await;
                    let text = slot.collector.format_for_analysis(&result);
                    (result, text)
                });

                match task.await {
                    Ok((result, text)) => {
                        let error = result.failure.as_ref().map(ToString::to_string);
                        if result.is_failed() {
                            warn!(source = %name, error = error.as_deref().unwrap_or_default(), "Collector failed");
                        } else {
                            info!(source = %name, items = result.len(), "Collector finished");
                        }
                        let outcome = SourceOutcome {
                            name,
                            items: result.len(),
                            error,
                            sentinel: is_sentinel(&text),
                        };
                        (outcome, text)
                    }
                    Err(e) => {
                        error!(source = %name, error = %e, "Collector task panicked");
                        let outcome = SourceOutcome {
                            error: Some(format!("collector task failed: {e}")),
                            items: 0,
                            sentinel: true,
                            name: name.clone(),
                        };
                        (outcome, sentinel(&name))
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut summary = RunSummary::default();
        let mut sections = Vec::with_capacity(results.len());
        for (outcome, text) in results {
            summary.outcomes.push(outcome);
            sections.push(text);
        }
        summary.corpus = sections.join("\n");

        if self.persist {
            if let Err(e) = self.cache.persist().await {
                error!(path = %self.cache.path().display(), error = %e, "Failed to persist seen-set");
                summary.persist_error = Some(e.to_string());
            }
        } else {
            info!("Dry run; seen-set not persisted");
        }

        info!(
            items = summary.total_items(),
            failed = summary.failed_sources(),
            corpus_chars = summary.corpus.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Collection complete"
        );
        summary
    }
}

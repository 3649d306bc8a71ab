//! # Trend Reporter
//!
//! A scheduled trend-report pipeline: collects what is new on news, tech and
//! community sources, skips everything earlier runs already reported, has an
//! LLM write a report about the rest, posts it to Discord and publishes it
//! to a static site.
//!
//! ## Usage
//!
//! ```sh
//! trend_reporter --config config/sources.yaml
//! ```
//!
//! ## Architecture
//!
//! 1. **Collection**: every enabled collector runs concurrently against the
//!    shared seen-set; results are merged into one text corpus
//! 2. **Dedup**: accepted identifiers are persisted once, after collection
//! 3. **Analysis**: the corpus goes to the model via `awful_aj` (or is used
//!    as-is with `--raw`)
//! 4. **Output**: Discord webhook and `docs/` static site

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analysis;
mod cache;
mod cli;
mod collectors;
mod config;
mod fetch;
mod models;
mod notify;
mod orchestrator;
mod outputs;
mod report;
mod retry;
mod utils;

use analysis::{AwfulAsk, RetryAsk, analyze, load_model};
use cache::SeenCache;
use cache::lock::{LockError, RunLock};
use cli::Cli;
use collectors::CollectorContext;
use config::Config;
use fetch::HttpFetcher;
use notify::DiscordNotifier;
use orchestrator::{EmptinessPolicy, Orchestrator, RunOutcome, slots_from_config};
use report::{Report, default_title, local_time, timestamp};
use utils::{ensure_writable_dir, truncate_for_log};

/// Post a short note; failures are logged only.
async fn post_note(notifier: &DiscordNotifier, text: &str) {
    if let Err(e) = notifier.send_simple(text).await {
        error!(error = %e, "Failed to send note");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("trend_reporter starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.docs_dir, raw = args.raw, dry_run = args.dry_run, "Parsed CLI arguments");

    // ---- Load config ----
    let config = Config::load(&args.config)?;
    let docs_dir = args
        .docs_dir
        .clone()
        .unwrap_or_else(|| config.report.docs_dir.clone());
    let category = args
        .category
        .clone()
        .unwrap_or_else(|| config.report.category.clone());
    let webhook_url = args
        .webhook_url
        .clone()
        .or_else(|| config.report.webhook_url.clone());

    // Early check: ensure the site directory is writable
    if !args.dry_run {
        let docs = docs_dir.to_string_lossy();
        if let Err(e) = ensure_writable_dir(&docs).await {
            error!(
                path = %docs,
                error = %e,
                "Site directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Run lock ----
    let _lock = if args.dry_run {
        None
    } else {
        match RunLock::acquire(&config.cache.dir) {
            Ok(lock) => {
                debug!(path = %lock.path().display(), "Holding run lock");
                Some(lock)
            }
            Err(LockError::Held { pid }) => {
                warn!(pid, "Another run holds the cache lock; skipping this run");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Could not take the run lock; continuing without it");
                None
            }
        }
    };

    // ---- Seen-set ----
    let cache = Arc::new(SeenCache::load(config.cache.file_path(), config.cache.policy()?).await);
    if cache.is_empty() {
        info!("Seen-set is empty; every collected item counts as new");
    } else {
        info!(entries = cache.len(), "Seen-set ready");
    }

    // ---- Collect ----
    let fetcher = HttpFetcher::new(&config.http)?;
    let client = fetcher.client().clone();
    let ctx = CollectorContext::new(cache.clone(), Arc::new(fetcher))
        .with_browser_user_agent(config.http.browser_user_agent.clone());

    let slots = slots_from_config(&config, &ctx);
    if slots.is_empty() {
        warn!("No sources enabled; nothing to do");
        return Ok(());
    }

    let mut orchestrator = Orchestrator::new(slots, cache.clone(), config.run.concurrency);
    if args.dry_run {
        orchestrator = orchestrator.without_persist();
    }
    let summary = orchestrator.run_all().await;
    debug!(corpus = %truncate_for_log(&summary.corpus, 500), "Merged corpus");

    if args.dry_run {
        println!("{}", summary.corpus);
        info!(
            elapsed_secs = start_time.elapsed().as_secs_f64(),
            items = summary.total_items(),
            "Dry run finished"
        );
        return Ok(());
    }

    let local = local_time(Utc::now(), config.run.utc_offset_hours);
    let title = default_title(&local);
    let notifier = DiscordNotifier::new(client, webhook_url);
    if !notifier.is_configured() {
        warn!("No Discord webhook configured; the report is only published to the site");
    }

    // ---- Classify ----
    let policy = EmptinessPolicy {
        min_corpus_chars: config.run.min_corpus_chars,
    };
    match summary.classify(&policy) {
        RunOutcome::Fresh => {
            info!(items = summary.total_items(), "New items collected");
        }
        RunOutcome::NothingNew => {
            info!(items = summary.total_items(), "Nothing new since the last report");
            post_note(&notifier, &format!("{title}: no new updates since the last report.")).await;
            return Ok(());
        }
        RunOutcome::AllSourcesFailed => {
            error!(sources = summary.outcomes.len(), "Every source failed");
            post_note(
                &notifier,
                &format!(
                    "{title}: every source failed ({} sources); no report this run.",
                    summary.outcomes.len()
                ),
            )
            .await;
            return Ok(());
        }
    }

    // ---- Build report ----
    let report = if args.raw {
        info!("Raw mode; skipping analysis");
        Report::raw(&summary.corpus, title)
    } else {
        let (aj_config, template) = load_model(args.aj_config.as_deref(), &config.report.template).await?;
        let model = RetryAsk::new(AwfulAsk {
            config: &aj_config,
            template: &template,
        });
        match analyze(&model, &summary.corpus, &timestamp(&local), title.clone()).await {
            Ok(report) => report,
            Err(e) => {
                post_note(&notifier, &format!("{title}: analysis failed; no report this run.")).await;
                return Err(e);
            }
        }
    };

    // ---- Notify ----
    match notifier.send(&report).await {
        Ok(true) => info!("Report delivered"),
        Ok(false) => {}
        Err(e) => error!(error = %e, "Failed to deliver report"),
    }

    // ---- Publish ----
    match outputs::publish(&docs_dir, &report, &local, &category, &config.report.site_title).await {
        Ok(filename) => info!(%filename, "Report published"),
        Err(e) => error!(error = %e, "Failed to publish report"),
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        items = summary.total_items(),
        failed_sources = summary.failed_sources(),
        "trend_reporter finished"
    );

    Ok(())
}

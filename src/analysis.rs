//! Model analysis of the merged corpus.
//!
//! The corpus is sent through `awful_aj` with the configured chat template.
//! Calls go through the [`AskAsync`] seam so the retry decorator and tests
//! can wrap or replace the model:
//! - [`AwfulAsk`]: the real `awful_aj::api::ask` call
//! - [`RetryAsk`]: exponential backoff around any [`AskAsync`]

use crate::report::{Report, split_report};
use crate::retry::Backoff;
use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

const ANALYSIS_RETRIES: usize = 5;
const ANALYSIS_BASE_DELAY: Duration = Duration::from_secs(1);
const ANALYSIS_MAX_DELAY: Duration = Duration::from_secs(30);

/// Send text to a model and get its answer back.
pub trait AskAsync {
    /// What the model answers with; `String` for chat models.
    type Response;

    /// Send `text` as one user message.
    ///
    /// # Returns
    ///
    /// The model's answer, or the error of the failed call.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Retries the wrapped model on any error.
///
/// ```text
/// delay = min(1s * 2^(attempt-1), 30s) + random_jitter(0..=250ms)
/// ```
pub struct RetryAsk<T> {
    /// The wrapped model.
    inner: T,
    /// Schedule used between failed calls.
    backoff: Backoff,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Wrap `inner` with the default schedule (5 retries, 1s doubling to 30s).
    pub fn new(inner: T) -> Self {
        Self::with_backoff(
            inner,
            Backoff::new(ANALYSIS_RETRIES, ANALYSIS_BASE_DELAY, ANALYSIS_MAX_DELAY),
        )
    }

    /// Wrap `inner` with an explicit schedule.
    pub fn with_backoff(inner: T, backoff: Backoff) -> Self {
        Self { inner, backoff }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        self.backoff
            .retry("ask", |_| true, || self.inner.ask(text))
            .await
    }
}

/// `awful_aj::api::ask` with a loaded config and template.
#[derive(Debug)]
pub struct AwfulAsk<'a> {
    /// Endpoint, model name and API key.
    pub config: &'a AwfulJadeConfig,
    /// System prompt and seed messages of the report template.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AwfulAsk<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(chars = text.len()))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

/// Load the awful_aj config (`--aj-config` or `<config_dir>/config.yaml`)
/// and the named chat template.
///
/// # Arguments
///
/// * `aj_config` - Explicit config file, if given on the command line
/// * `template_name` - Template file stem in the awful_aj templates directory
///
/// # Returns
///
/// The parsed config and template, or the first load error.
#[instrument(level = "info", skip(aj_config))]
pub async fn load_model(
    aj_config: Option<&Path>,
    template_name: &str,
) -> Result<(AwfulJadeConfig, ChatTemplate), Box<dyn Error>> {
    let conf_file = match aj_config {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file
        .to_str()
        .ok_or_else(|| format!("not a valid config filename: {}", conf_file.display()))?;
    let config = config::load_config(config_path)?;
    info!(config_path, "Loaded model configuration");

    let template = template::load_template(template_name).await?;
    info!(template = template_name, "Loaded template");
    Ok((config, template))
}

/// The text sent to the model: collection time, then the corpus.
pub fn build_prompt(corpus: &str, collected_at: &str) -> String {
    format!("Collected at: {collected_at}\n\n{corpus}")
}

/// Ask the model for a report on `corpus` and split the answer.
///
/// # Arguments
///
/// * `model` - Any [`AskAsync`] answering with text, usually a [`RetryAsk`]
/// * `corpus` - The merged collector blocks
/// * `collected_at` - Human-readable collection time put in the prompt
/// * `default_title` - Title used when the answer has no `TITLE:` line
///
/// # Returns
///
/// The split [`Report`]. An empty answer or a failed call is an error.
#[instrument(level = "info", skip_all, fields(corpus_chars = corpus.len()))]
pub async fn analyze<A>(
    model: &A,
    corpus: &str,
    collected_at: &str,
    default_title: String,
) -> Result<Report, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    let t0 = Instant::now();
    let answer = match model.ask(&build_prompt(corpus, collected_at)).await {
        Ok(answer) => answer,
        Err(e) => {
            error!(elapsed_ms_total = t0.elapsed().as_millis() as u64, error = %e, "Analysis failed");
            return Err(e);
        }
    };

    if answer.trim().is_empty() {
        return Err("model returned an empty report".into());
    }

    let report = split_report(&answer, default_title);
    info!(
        elapsed_ms_total = t0.elapsed().as_millis() as u64,
        title = %report.title,
        keywords = report.keywords.len(),
        "Analysis succeeded"
    );
    Ok(report)
}

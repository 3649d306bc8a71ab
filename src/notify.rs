//! Discord webhook notifier.
//!
//! A report is posted as a series of embeds, one request each. The body is
//! split on line boundaries into chunks of at most [`MESSAGE_LIMIT`] chars.
//! The first embed carries the title and the last one carries the keywords
//! as its footer.

use crate::report::Report;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub const MESSAGE_LIMIT: usize = 1900;
pub const EMBED_COLOUR: u32 = 5_814_783;
const EMPTY_BODY: &str = "(no content)";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook answered {status}")]
    Status { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footer {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
}

#[derive(Debug, Serialize)]
struct EmbedMessage<'a> {
    embeds: [&'a Embed; 1],
}

#[derive(Debug, Serialize)]
struct SimpleMessage<'a> {
    content: &'a str,
}

/// Split `text` into chunks of at most `max` chars, breaking between lines.
/// A single line longer than `max` is cut on char boundaries.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    let mut flush = |current: &mut String, current_len: &mut usize| {
        let chunk = current.trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        current.clear();
        *current_len = 0;
    };

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max {
            flush(&mut current, &mut current_len);
            let chars: Vec<char> = line.chars().collect();
            let mut pieces = chars.chunks(max).peekable();
            while let Some(piece) = pieces.next() {
                current.extend(piece);
                current_len = piece.len();
                if pieces.peek().is_some() {
                    flush(&mut current, &mut current_len);
                }
            }
            current.push('\n');
            current_len += 1;
            continue;
        }

        if current_len + line_len + 1 > max {
            flush(&mut current, &mut current_len);
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len + 1;
    }
    flush(&mut current, &mut current_len);

    chunks
}

/// One embed per chunk of the report body.
pub fn build_embeds(report: &Report) -> Vec<Embed> {
    let body = if report.body.trim().is_empty() {
        EMPTY_BODY
    } else {
        report.body.as_str()
    };

    let mut embeds: Vec<Embed> = split_message(body, MESSAGE_LIMIT)
        .into_iter()
        .enumerate()
        .map(|(i, description)| Embed {
            title: (i == 0).then(|| report.title.clone()),
            description,
            color: EMBED_COLOUR,
            footer: None,
        })
        .collect();

    if !report.keywords.is_empty() {
        if let Some(last) = embeds.last_mut() {
            last.footer = Some(Footer {
                text: format!("Keywords: {}", report.keywords.join(", ")),
            });
        }
    }
    embeds
}

#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    /// An empty URL counts as unset.
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn post<T: Serialize>(&self, url: &str, payload: &T) -> Result<(), NotifyError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Post the report. `Ok(false)` when no webhook is configured.
    #[instrument(level = "info", skip_all, fields(title = %report.title))]
    pub async fn send(&self, report: &Report) -> Result<bool, NotifyError> {
        let Some(url) = self.webhook_url.as_deref() else {
            warn!("Webhook URL not set; skipping notification");
            return Ok(false);
        };

        let embeds = build_embeds(report);
        for embed in &embeds {
            self.post(url, &EmbedMessage { embeds: [embed] }).await?;
        }
        info!(messages = embeds.len(), "Sent report to Discord");
        Ok(true)
    }

    /// Post a plain text message.
    #[instrument(level = "info", skip_all)]
    pub async fn send_simple(&self, text: &str) -> Result<bool, NotifyError> {
        let Some(url) = self.webhook_url.as_deref() else {
            warn!("Webhook URL not set; skipping notification");
            return Ok(false);
        };
        self.post(url, &SimpleMessage { content: text }).await?;
        info!("Sent message to Discord");
        Ok(true)
    }
}

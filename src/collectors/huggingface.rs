//! Hugging Face Hub collector.
//!
//! Two listings of the `models` endpoint: most downloaded ("trending") and
//! most recently modified ("recent", only models that already have some
//! traction). A model that shows up in both is reported once, as trending.

use super::format::{Entry, bracketed, render_section, sentinel, thousands};
use super::{CollectError, Collector, CollectorContext, OVERFETCH_FACTOR, merge_ranked};
use crate::config::HuggingFaceSettings;
use crate::models::{CollectedItem, CollectorResult, ContentId, ItemDetail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, instrument};

const NAME: &str = "Hugging Face";
const HEADING: &str = "Hugging Face AI Models";
const TRENDING_NAMESPACE: &str = "hf";
const RECENT_NAMESPACE: &str = "hf_recent";
const RECENT_OVERFETCH: usize = 3;
const MODEL_PAGE: &str = "https://huggingface.co";
const DISPLAY_LIMIT: usize = 13;

#[derive(Debug, Deserialize)]
struct Model {
    #[serde(default)]
    id: String,
    /// Older responses only carry `modelId`; current ones send both.
    #[serde(default, rename = "modelId")]
    model_id: String,
    #[serde(default)]
    downloads: i64,
    #[serde(default)]
    likes: i64,
    #[serde(default)]
    pipeline_tag: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct HuggingFaceCollector {
    ctx: CollectorContext,
    base_url: String,
    recent_limit: usize,
    recent_min_downloads: i64,
}

impl HuggingFaceCollector {
    pub fn new(ctx: CollectorContext, settings: &HuggingFaceSettings) -> Self {
        Self {
            ctx,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            recent_limit: settings.recent,
            recent_min_downloads: settings.recent_min_downloads,
        }
    }

    fn models_url(&self, sort: &str, fetch: usize) -> String {
        format!(
            "{}/models?sort={sort}&direction=-1&limit={fetch}&full=true",
            self.base_url
        )
    }

    #[instrument(level = "info", skip(self))]
    async fn collect_trending(&self, limit: usize) -> Result<Vec<CollectedItem>, CollectError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let url = self.models_url("downloads", limit * OVERFETCH_FACTOR);
        let models: Vec<Value> = self.ctx.get_json(NAME, &url, &[]).await?;

        let candidates = models
            .into_iter()
            .take(limit * OVERFETCH_FACTOR)
            .map(|raw| parse_model(raw, false));
        let models = self.ctx.take_unseen(candidates, limit);
        info!(count = models.len(), "Collected trending models");
        Ok(models)
    }

    #[instrument(level = "info", skip(self, exclude))]
    async fn collect_recent(&self, exclude: &HashSet<String>) -> Result<Vec<CollectedItem>, CollectError> {
        let limit = self.recent_limit;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let url = self.models_url("lastModified", limit * RECENT_OVERFETCH);
        let models: Vec<Value> = self.ctx.get_json(NAME, &url, &[]).await?;

        let min_downloads = self.recent_min_downloads;
        let candidates = models
            .into_iter()
            .take(limit * RECENT_OVERFETCH)
            .map(|raw| parse_model(raw, true))
            .filter(|candidate| match candidate {
                Some(item) => item.rank_signal >= min_downloads && !exclude.contains(&item.title),
                None => true,
            });
        let models = self.ctx.take_unseen(candidates, limit);
        info!(count = models.len(), "Collected recently updated models");
        Ok(models)
    }
}

/// The item title is the bare model id (`author/name`).
fn parse_model(raw: Value, recent: bool) -> Option<CollectedItem> {
    let mut model: Model = serde_json::from_value(raw).ok()?;
    if model.id.is_empty() {
        model.id = std::mem::take(&mut model.model_id);
    }
    if model.id.is_empty() {
        return None;
    }

    let namespace = if recent { RECENT_NAMESPACE } else { TRENDING_NAMESPACE };
    Some(CollectedItem {
        id: ContentId::new(namespace, &model.id),
        source: NAME.to_string(),
        url: format!("{MODEL_PAGE}/{}", model.id),
        title: model.id,
        rank_signal: model.downloads,
        secondary_signal: model.likes,
        timestamp: None,
        detail: ItemDetail::Model {
            pipeline_tag: model.pipeline_tag.unwrap_or_default(),
            tags: model.tags.into_iter().take(5).collect(),
            recent,
        },
    })
}

#[async_trait]
impl Collector for HuggingFaceCollector {
    fn name(&self) -> &str {
        NAME
    }

    async fn collect(&self, limit: usize) -> CollectorResult {
        let trending = self.collect_trending(limit).await;
        let trending_models: HashSet<String> = match &trending {
            Ok(items) => items.iter().map(|i| i.title.clone()).collect(),
            Err(_) => HashSet::new(),
        };
        let recent = self.collect_recent(&trending_models).await;
        let cap = (limit + self.recent_limit).min(DISPLAY_LIMIT);
        self.ctx.claim(merge_ranked(NAME, vec![trending, recent], cap))
    }

    fn format_for_analysis(&self, result: &CollectorResult) -> String {
        if result.is_empty() {
            return sentinel(NAME);
        }
        render_section(HEADING, &result.items, |item| {
            let (pipeline, tags, recent) = match &item.detail {
                ItemDetail::Model {
                    pipeline_tag,
                    tags,
                    recent,
                } => (pipeline_tag.as_str(), tags.as_slice(), *recent),
                _ => ("", &[][..], false),
            };
            let title = if recent {
                format!("{}{} (recently updated)", bracketed(pipeline), item.title)
            } else {
                format!("{}{}", bracketed(pipeline), item.title)
            };
            let entry = Entry::new(
                title,
                format!(
                    "Downloads: {} | Likes: {}",
                    thousands(item.rank_signal),
                    thousands(item.secondary_signal)
                ),
            );
            if tags.is_empty() {
                entry
            } else {
                entry.with_note(format!("Tags: {}", tags.iter().take(3).cloned().collect::<Vec<_>>().join(", ")))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::{assert_seen_matches_rendered, context};
    use crate::fetch::testing::StubFetcher;

    const BASE: &str = "https://hf.test/api";

    fn model(id: &str, downloads: i64) -> String {
        format!(
            r#"{{"id": "{id}", "downloads": {downloads}, "likes": 12, "pipeline_tag": "text-generation",
                "tags": ["transformers", "safetensors", "llama", "en", "license:mit", "extra"]}}"#
        )
    }

    fn collector(fetch: StubFetcher) -> HuggingFaceCollector {
        let settings = HuggingFaceSettings {
            base_url: BASE.to_string(),
            recent: 2,
            ..HuggingFaceSettings::default()
        };
        HuggingFaceCollector::new(context(fetch), &settings)
    }

    fn stub() -> StubFetcher {
        let trending = format!("[{}, {}]", model("meta/llama", 5_000_000), model("org/bert", 900_000));
        let recent = format!(
            "[{}, {}, {}, {}]",
            model("meta/llama", 5_000_000),
            model("tiny/toy", 10),
            model("lab/new-model", 20_000),
            r#"{"downloads": 99999}"#
        );
        StubFetcher::new()
            .with(&format!("{BASE}/models?sort=downloads&direction=-1&limit=4&full=true"), trending)
            .with(&format!("{BASE}/models?sort=lastModified&direction=-1&limit=6&full=true"), recent)
    }

    #[test]
    fn test_parse_model_accepts_both_id_fields() {
        let both = serde_json::json!({"_id": "abc", "id": "meta/llama", "modelId": "meta/llama", "downloads": 3});
        assert_eq!(parse_model(both, false).unwrap().title, "meta/llama");

        let legacy = serde_json::json!({"modelId": "org/bert", "downloads": 3});
        assert_eq!(parse_model(legacy, true).unwrap().id.as_str(), "hf_recent_org/bert");
    }

    #[tokio::test]
    async fn test_trending_and_recent_dedup_by_model() {
        let result = collector(stub()).collect(2).await;
        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["hf_meta/llama", "hf_org/bert", "hf_recent_lab/new-model"]);
        assert_eq!(result.items[0].url, "https://huggingface.co/meta/llama");
        assert!(matches!(&result.items[0].detail, ItemDetail::Model { tags, .. } if tags.len() == 5));
    }

    #[tokio::test]
    async fn test_recent_still_collected_when_trending_fails() {
        let recent = format!("[{}]", model("lab/new-model", 20_000));
        let fetch = StubFetcher::new().with(
            &format!("{BASE}/models?sort=lastModified&direction=-1&limit=6&full=true"),
            recent,
        );
        let result = collector(fetch).collect(2).await;
        assert!(!result.is_failed());
        assert_eq!(result.items[0].id.as_str(), "hf_recent_lab/new-model");
    }

    #[tokio::test]
    async fn test_format_for_analysis() {
        let c = collector(stub());
        let result = c.collect(2).await;
        let text = c.format_for_analysis(&result);
        assert!(text.contains("## Hugging Face AI Models"));
        assert!(text.contains("1. [text-generation] meta/llama\n   Downloads: 5,000,000 | Likes: 12\n   Tags: transformers, safetensors, llama\n"));
        assert!(text.contains("[text-generation] lab/new-model (recently updated)"));
    }

    #[tokio::test]
    async fn test_overflowing_listing_claims_only_rendered_models() {
        let trending = (1..=20)
            .map(|n| model(&format!("org/model-{n}"), n * 1_000))
            .collect::<Vec<_>>()
            .join(",");
        let fetch = StubFetcher::new()
            .with(
                &format!("{BASE}/models?sort=downloads&direction=-1&limit=40&full=true"),
                format!("[{trending}]"),
            )
            .with(&format!("{BASE}/models?sort=lastModified&direction=-1&limit=6&full=true"), "[]");
        let ctx = context(fetch);
        let cache = ctx.cache.clone();
        let settings = HuggingFaceSettings {
            base_url: BASE.to_string(),
            recent: 2,
            ..HuggingFaceSettings::default()
        };
        let c = HuggingFaceCollector::new(ctx, &settings);

        let result = c.collect(20).await;
        assert_eq!(result.len(), DISPLAY_LIMIT);
        let text = c.format_for_analysis(&result);
        assert_seen_matches_rendered(&cache, &result, &text);
        assert!(!cache.is_seen(&ContentId::new(TRENDING_NAMESPACE, "org/model-1")));
    }
}

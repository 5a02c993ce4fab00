// src/stages/enrich.rs
//! Summary repair, translation, labels and one-liners.
//!
//! Every batch is independent. A failed batch leaves its items with the values
//! they had before enrichment; other batches are unaffected.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{CallContext, Stage};
use crate::config::{CurationPolicy, PipelineConfig};
use crate::generation::parse::{parse_array_lenient, parse_object, WireId};
use crate::generation::CallSite;
use crate::model::{NewsItem, Phase, PipelineState};
use crate::text::{is_only_punctuation, needs_translation, sanitize_line};

const TITLE_MAX_CHARS: usize = 500;
const SUMMARY_MAX_CHARS: usize = 1500;
const ONE_LINER_MAX_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct RepairEntry {
    id: WireId,
    #[serde(default)]
    enhanced_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslateEntry {
    id: WireId,
    #[serde(default, alias = "title_translated")]
    title_zh: Option<String>,
    #[serde(default, alias = "summary_translated")]
    summary_zh: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LabelReply {
    #[serde(default)]
    labels: HashMap<String, Option<String>>,
    #[serde(default, alias = "one_liners")]
    oneliners: HashMap<String, Option<String>>,
}

/// True when a summary is too thin to show as-is.
pub fn needs_repair(title: &str, summary: &str, min_chars: usize) -> bool {
    let s = summary.trim();
    if s.chars().count() < min_chars || is_only_punctuation(s) {
        return true;
    }
    let s = s.to_lowercase();
    let t = title.trim().to_lowercase();
    s == t || t.starts_with(&s)
}

fn clean(text: Option<String>, max_chars: usize) -> Option<String> {
    text.map(|t| sanitize_line(&t, max_chars))
        .filter(|t| !t.is_empty())
}

pub struct Enricher {
    ctx: CallContext,
    policy: Arc<CurationPolicy>,
    enrich_batch_size: usize,
    label_batch_size: usize,
    min_summary_chars: usize,
}

impl Enricher {
    pub fn new(ctx: CallContext, policy: Arc<CurationPolicy>, cfg: &PipelineConfig) -> Self {
        Self {
            ctx,
            policy,
            enrich_batch_size: cfg.enrich_batch_size.max(1),
            label_batch_size: cfg.label_batch_size.max(1),
            min_summary_chars: cfg.min_summary_chars,
        }
    }

    /// Rewrite thin summaries. Returns how many were replaced.
    async fn repair_summaries(&self, items: &mut [NewsItem]) -> usize {
        let entries: Vec<Value> = items
            .iter()
            .filter(|it| needs_repair(&it.title, &it.summary, self.min_summary_chars))
            .map(|it| self.ctx.item_entry(it))
            .collect();
        if entries.is_empty() {
            return 0;
        }

        let system = "Some news items have a missing or useless summary. \
            For each item write a factual 1-2 sentence English summary based on the title, \
            source and any existing text. Do not invent numbers. \
            Input is a JSON array of items with an `id`. \
            Reply with JSON only: [{\"id\": \"...\", \"enhanced_summary\": \"...\"}]."
            .to_string();
        let batches = chunked(entries, self.enrich_batch_size);
        let replies = self
            .ctx
            .ask_batches(CallSite::RepairSummary, &system, batches, parse_array_lenient::<RepairEntry>)
            .await;

        let mut repaired: HashMap<String, String> = HashMap::new();
        for e in replies.into_iter().flatten().flatten() {
            if let Some(s) = clean(e.enhanced_summary, SUMMARY_MAX_CHARS) {
                repaired.entry(e.id.into_key()).or_insert(s);
            }
        }

        let mut n = 0;
        for it in items.iter_mut() {
            if !needs_repair(&it.title, &it.summary, self.min_summary_chars) {
                continue;
            }
            if let Some(s) = repaired.remove(&it.id) {
                it.summary = s;
                n += 1;
            }
        }
        n
    }

    /// Fill translated slots. Text that needs no translation is copied verbatim.
    async fn translate(&self, items: &mut [NewsItem]) -> usize {
        let mut entries: Vec<Value> = Vec::new();
        for it in items.iter_mut() {
            let title_needs = needs_translation(&it.title);
            let summary_needs = needs_translation(&it.summary);
            if !title_needs && !it.title.is_empty() {
                it.title_translated = Some(it.title.clone());
            }
            if !summary_needs && !it.summary.is_empty() {
                it.summary_translated = Some(it.summary.clone());
            }
            if title_needs || summary_needs {
                let mut e = Map::new();
                e.insert("id".into(), json!(it.id));
                if title_needs {
                    e.insert("title".into(), json!(it.title));
                }
                if summary_needs {
                    e.insert("summary".into(), json!(it.summary));
                }
                entries.push(Value::Object(e));
            }
        }
        if entries.is_empty() {
            return 0;
        }

        let system = format!(
            "Translate the `title` and `summary` fields of each item into {lang}. \
             Keep product names, code identifiers and acronyms unchanged. \
             Input is a JSON array of items with an `id`; some items only have one of the fields. \
             Reply with JSON only: [{{\"id\": \"...\", \"title_zh\": \"...\", \"summary_zh\": \"...\"}}], \
             omitting fields that were not given.",
            lang = self.ctx.target_language
        );
        let batches = chunked(entries, self.enrich_batch_size);
        let replies = self
            .ctx
            .ask_batches(CallSite::Translate, &system, batches, parse_array_lenient::<TranslateEntry>)
            .await;

        let mut translated: HashMap<String, TranslateEntry> = HashMap::new();
        for e in replies.into_iter().flatten().flatten() {
            translated.entry(e.id.clone().into_key()).or_insert(e);
        }

        let mut n = 0;
        for it in items.iter_mut() {
            let Some(e) = translated.remove(&it.id) else {
                continue;
            };
            if needs_translation(&it.title) {
                if let Some(t) = clean(e.title_zh, TITLE_MAX_CHARS) {
                    it.title_translated = Some(t);
                    n += 1;
                }
            }
            if needs_translation(&it.summary) {
                if let Some(s) = clean(e.summary_zh, SUMMARY_MAX_CHARS) {
                    it.summary_translated = Some(s);
                }
            }
        }
        n
    }

    /// Sparse labels from the vocabulary plus a one-line takeaway per item.
    async fn label(&self, items: &mut [NewsItem]) -> (usize, usize) {
        if items.is_empty() {
            return (0, 0);
        }
        let entries: Vec<Value> = items
            .iter()
            .map(|it| {
                json!({
                    "id": it.id,
                    "title": it.display_title(),
                    "summary": self.ctx.excerpt(
                        it.summary_translated.as_deref().unwrap_or(&it.summary)
                    ),
                    "source": it.source,
                    "category": it.category.as_str(),
                    "score": it.score,
                })
            })
            .collect();

        let system = format!(
            "For each news item:\n\
             1. Optionally assign ONE label from [{labels}]. Most items get no label; \
             only label items that clearly fit.\n\
             2. Write a one-line takeaway in {lang}, at most 40 characters.\n\
             Input is a JSON array of items with an `id`. \
             Reply with JSON only: {{\"labels\": {{\"id\": \"Label\"}}, \"oneliners\": {{\"id\": \"...\"}}}}.",
            labels = self.policy.labels.join(", "),
            lang = self.ctx.target_language
        );
        let batches = chunked(entries, self.label_batch_size);
        let replies = self
            .ctx
            .ask_batches(CallSite::Label, &system, batches, parse_object::<LabelReply>)
            .await;

        let mut labels: HashMap<String, String> = HashMap::new();
        let mut oneliners: HashMap<String, String> = HashMap::new();
        for reply in replies.into_iter().flatten() {
            for (id, raw) in reply.labels {
                let Some(raw) = raw else { continue };
                match self.policy.canonical_label(&raw) {
                    Some(l) => {
                        labels.entry(id.trim().to_string()).or_insert_with(|| l.to_string());
                    }
                    None => {
                        tracing::debug!(target: "enrich", label = %raw, "label outside vocabulary ignored");
                    }
                }
            }
            for (id, text) in reply.oneliners {
                if let Some(t) = clean(text, ONE_LINER_MAX_CHARS) {
                    oneliners.entry(id.trim().to_string()).or_insert(t);
                }
            }
        }

        let (mut nl, mut no) = (0, 0);
        for it in items.iter_mut() {
            if let Some(l) = labels.remove(&it.id) {
                it.label = Some(l);
                nl += 1;
            }
            if let Some(o) = oneliners.remove(&it.id) {
                it.one_liner = Some(o);
                no += 1;
            }
        }
        (nl, no)
    }
}

fn chunked(entries: Vec<Value>, size: usize) -> Vec<Vec<Value>> {
    entries.chunks(size.max(1)).map(<[Value]>::to_vec).collect()
}

#[async_trait]
impl Stage for Enricher {
    fn name(&self) -> &'static str {
        "enrich"
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let repaired = self.repair_summaries(&mut state.items).await;
        let translated = self.translate(&mut state.items).await;
        let (labeled, one_liners) = self.label(&mut state.items).await;

        tracing::info!(
            target: "enrich",
            items = state.items.len(),
            repaired,
            translated,
            labeled,
            one_liners,
            "enrichment finished"
        );
        state.advance(Phase::Enriched);
        state
    }
}

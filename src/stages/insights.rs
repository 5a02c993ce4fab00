// src/stages/insights.rs
//! Run-level artifacts: trends, topic clusters, a bullet summary, action
//! items and a short commentary. Items themselves are untouched.
//!
//! Trends and clusters go first (concurrently), the summary builds on the
//! trends, and commentary and action items build on both.

use std::cmp::Reverse;
use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{payload, CallContext, Reply, Stage};
use crate::config::PipelineConfig;
use crate::generation::parse::{parse_array_lenient, parse_text, WireId};
use crate::generation::{CallSite, GenerationRequest};
use crate::model::{ActionItem, Category, Cluster, NewsItem, PipelineState};
use crate::text::sanitize_line;

const TREND_MAX_CHARS: usize = 120;
const MIN_ITEMS_FOR_CLUSTERS: usize = 3;
const MIN_CLUSTER_SIZE: usize = 2;
const SUMMARY_POOL: usize = 5;
const MAX_SUMMARY_BULLETS: usize = 5;
const BULLET_MAX_CHARS: usize = 200;
const COMMENTARY_MAX_CHARS: usize = 1000;
const ACTION_POOL: usize = 10;
/// Items at or above this score join the action-item pool beyond the top ones.
const ACTION_MIN_SCORE: u8 = 6;
const MAX_ACTION_ITEMS: usize = 4;
const ACTION_FIELD_MAX_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    #[serde(default)]
    topic: String,
    #[serde(default, alias = "ids", alias = "item_ids")]
    news_ids: Vec<WireId>,
    #[serde(default)]
    summary: String,
}

pub struct Insights {
    ctx: CallContext,
    enabled: bool,
    trend_pool: usize,
    max_trends: usize,
    cluster_pool: usize,
}

impl Insights {
    pub fn new(ctx: CallContext, cfg: &PipelineConfig) -> Self {
        Self {
            ctx,
            enabled: cfg.insights,
            trend_pool: cfg.trend_pool,
            max_trends: cfg.max_trends,
            cluster_pool: cfg.cluster_pool,
        }
    }

    async fn trends(&self, pool: &[&NewsItem]) -> Vec<String> {
        if pool.is_empty() {
            return Vec::new();
        }
        let entries = pool
            .iter()
            .map(|it| {
                json!({
                    "id": it.id,
                    "title": it.display_title(),
                    "category": it.category.as_str(),
                    "score": it.score,
                })
            })
            .collect();
        let system = format!(
            "From today's most important news items, name 3-5 technology trends. \
             Each trend is one short phrase in {}. \
             Reply with JSON only: a JSON array of strings.",
            self.ctx.target_language
        );
        let req = GenerationRequest::new(CallSite::Trends, system, payload(entries));
        match self.ctx.ask(req, parse_array_lenient::<String>).await {
            Reply::Parsed(list) => list
                .into_iter()
                .map(|t| sanitize_line(&t, TREND_MAX_CHARS))
                .filter(|t| !t.is_empty())
                .take(self.max_trends)
                .collect(),
            Reply::Fallback(_) => Vec::new(),
        }
    }

    async fn clusters(&self, pool: &[&NewsItem], known: &HashSet<&str>) -> Vec<Cluster> {
        if pool.len() < MIN_ITEMS_FOR_CLUSTERS {
            return Vec::new();
        }
        let entries = pool
            .iter()
            .map(|it| {
                json!({
                    "id": it.id,
                    "title": it.display_title(),
                    "summary": self.ctx.excerpt(&it.summary),
                })
            })
            .collect();
        let system = format!(
            "Group related news items into topic clusters. Only group items that \
             share a concrete subject; leave the rest out. Write topic and summary in {}. \
             Reply with JSON only: [{{\"topic\": \"...\", \"news_ids\": [\"id1\", \"id2\"], \"summary\": \"...\"}}].",
            self.ctx.target_language
        );
        let req = GenerationRequest::new(CallSite::Clusters, system, payload(entries));
        let Reply::Parsed(list) = self.ctx.ask(req, parse_array_lenient::<ClusterEntry>).await else {
            return Vec::new();
        };

        list.into_iter()
            .filter_map(|c| {
                let mut seen = HashSet::new();
                let item_ids: Vec<String> = c
                    .news_ids
                    .into_iter()
                    .map(WireId::into_key)
                    .filter(|id| known.contains(id.as_str()) && seen.insert(id.clone()))
                    .collect();
                let topic = sanitize_line(&c.topic, TREND_MAX_CHARS);
                (item_ids.len() >= MIN_CLUSTER_SIZE && !topic.is_empty()).then(|| Cluster {
                    topic,
                    summary: sanitize_line(&c.summary, 400),
                    item_ids,
                })
            })
            .collect()
    }

    /// 3-5 bullet lines, or `""` when the call falls back.
    async fn summary(&self, state: &PipelineState, trends: &[String]) -> String {
        if state.items.is_empty() {
            return String::new();
        }
        let top = top_by_score(&state.items, SUMMARY_POOL);
        let user = json!({
            "total": state.items.len(),
            "categories": category_counts(&state.items),
            "trends": trends,
            "top": top.iter().map(|it| brief(it)).collect::<Vec<_>>(),
        });
        let system = format!(
            "Summarize today's AI news in 3-5 bullet points, in {}. \
             One line per bullet, each starting with \"- \". Reply with the bullets only.",
            self.ctx.target_language
        );
        let req = GenerationRequest::new(CallSite::Summary, system, user.to_string());
        match self.ctx.ask(req, parse_text).await {
            Reply::Parsed(text) => clean_bullets(&text),
            Reply::Fallback(_) => String::new(),
        }
    }

    async fn action_items(&self, items: &[NewsItem], trends: &[String]) -> Vec<ActionItem> {
        let pool: Vec<&NewsItem> = top_by_score(items, items.len())
            .into_iter()
            .enumerate()
            .take_while(|(i, it)| *i < ACTION_POOL || it.score >= ACTION_MIN_SCORE)
            .map(|(_, it)| it)
            .collect();
        if pool.is_empty() {
            return Vec::new();
        }
        let user = json!({
            "trends": trends,
            "items": pool.iter().map(|it| brief(it)).collect::<Vec<_>>(),
        });
        let system = format!(
            "Suggest 3-4 concrete follow-ups for an AI engineering team based on \
             today's trends and news. Write in {}. Reply with JSON only: \
             [{{\"type\": \"...\", \"title\": \"...\", \"reason\": \"...\", \"action\": \"...\", \"priority\": \"high|medium|low\"}}].",
            self.ctx.target_language
        );
        let req = GenerationRequest::new(CallSite::ActionItems, system, user.to_string());
        let Reply::Parsed(list) = self.ctx.ask(req, parse_array_lenient::<ActionItem>).await else {
            return Vec::new();
        };
        list.into_iter()
            .map(|a| ActionItem {
                kind: sanitize_line(&a.kind, TREND_MAX_CHARS),
                title: sanitize_line(&a.title, TREND_MAX_CHARS),
                reason: sanitize_line(&a.reason, ACTION_FIELD_MAX_CHARS),
                action: sanitize_line(&a.action, ACTION_FIELD_MAX_CHARS),
                priority: sanitize_line(&a.priority, 16).to_lowercase(),
            })
            .filter(|a| !a.title.is_empty())
            .take(MAX_ACTION_ITEMS)
            .collect()
    }

    /// One short paragraph, or `""` when the call falls back.
    async fn commentary(&self, items: &[NewsItem], trends: &[String], summary: &str) -> String {
        if items.is_empty() {
            return String::new();
        }
        let top = top_by_score(items, SUMMARY_POOL);
        let user = json!({
            "trends": trends,
            "top_titles": top.iter().map(|it| it.display_title()).collect::<Vec<_>>(),
            "summary": summary,
        });
        let system = format!(
            "Write a short editor's commentary (150-250 characters) on today's AI news, \
             in {}. Give a point of view, not a list. Reply with the text only.",
            self.ctx.target_language
        );
        let req = GenerationRequest::new(CallSite::Commentary, system, user.to_string());
        match self.ctx.ask(req, parse_text).await {
            Reply::Parsed(text) => sanitize_line(&text, COMMENTARY_MAX_CHARS),
            Reply::Fallback(_) => String::new(),
        }
    }
}

fn brief(it: &NewsItem) -> Value {
    json!({
        "id": it.id,
        "title": it.display_title(),
        "category": it.category.as_str(),
        "score": it.score,
    })
}

/// Item count per category, in priority order, empty categories left out.
fn category_counts(items: &[NewsItem]) -> Value {
    let mut out = serde_json::Map::new();
    for cat in Category::ALL {
        let n = items.iter().filter(|it| it.category == cat).count();
        if n > 0 {
            out.insert(cat.as_str().to_string(), n.into());
        }
    }
    Value::Object(out)
}

/// Non-empty lines, each re-prefixed with `- `, capped at five.
fn clean_bullets(text: &str) -> String {
    text.lines()
        .map(|l| l.trim().trim_start_matches(['-', '*', '•']).trim())
        .map(|l| sanitize_line(l, BULLET_MAX_CHARS))
        .filter(|l| !l.is_empty())
        .take(MAX_SUMMARY_BULLETS)
        .map(|l| format!("- {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Top `n` items by score, ties broken by ingestion order.
fn top_by_score(items: &[NewsItem], n: usize) -> Vec<&NewsItem> {
    let mut v: Vec<&NewsItem> = items.iter().collect();
    v.sort_by_key(|it| (Reverse(it.score), it.ingest_order));
    v.truncate(n);
    v
}

#[async_trait]
impl Stage for Insights {
    fn name(&self) -> &'static str {
        "insights"
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        if !self.enabled {
            tracing::debug!(target: "insights", "insights disabled");
            return state;
        }

        let (trends, clusters) = {
            let known: HashSet<&str> = state.items.iter().map(|it| it.id.as_str()).collect();
            let trend_pool = top_by_score(&state.items, self.trend_pool);
            let cluster_pool = if state.items.len() >= MIN_ITEMS_FOR_CLUSTERS {
                top_by_score(&state.items, self.cluster_pool)
            } else {
                Vec::new()
            };
            futures::join!(
                self.trends(&trend_pool),
                self.clusters(&cluster_pool, &known)
            )
        };

        let summary = self.summary(&state, &trends).await;
        let (action_items, commentary) = futures::join!(
            self.action_items(&state.items, &trends),
            self.commentary(&state.items, &trends, &summary)
        );

        tracing::info!(
            target: "insights",
            trends = trends.len(),
            clusters = clusters.len(),
            summary_lines = summary.lines().count(),
            action_items = action_items.len(),
            has_commentary = !commentary.is_empty(),
            "insights finished"
        );
        state.trends = trends;
        state.clusters = clusters;
        state.summary = summary;
        state.commentary = commentary;
        state.action_items = action_items;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScoreBand, DEFAULT_SCORE};

    fn item(id: &str, score: u8, order: usize) -> NewsItem {
        NewsItem {
            id: id.into(),
            title: id.into(),
            summary: String::new(),
            link: format!("https://x.example/{id}"),
            source: "S".into(),
            published: String::new(),
            category: Category::Industry,
            score,
            band: ScoreBand::from_score(score),
            score_reason: String::new(),
            label: None,
            title_translated: None,
            summary_translated: None,
            one_liner: None,
            ingest_order: order,
        }
    }

    #[test]
    fn top_by_score_is_stable() {
        let items = vec![
            item("a", DEFAULT_SCORE, 0),
            item("b", 9, 1),
            item("c", DEFAULT_SCORE, 2),
            item("d", 9, 3),
        ];
        let ids: Vec<&str> = top_by_score(&items, 3).iter().map(|it| it.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
    }

    #[test]
    fn bullets_are_normalized_and_capped() {
        let raw = "Today:\n\n- one\n* two\n• three\n  - four  \n-five\n- six";
        assert_eq!(
            clean_bullets(raw),
            "- Today:\n- one\n- two\n- three\n- four"
        );
        assert_eq!(clean_bullets("-\n  \n*"), "");
    }

    #[test]
    fn category_counts_skip_empty_categories() {
        let mut a = item("a", 7, 0);
        a.category = Category::Agent;
        let items = vec![a, item("b", 5, 1), item("c", 5, 2)];
        assert_eq!(category_counts(&items), json!({ "Agent": 1, "Industry": 2 }));
    }
}

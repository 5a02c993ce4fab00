// src/model.rs
//! Core data model: items, categories, score bands and the per-run pipeline state.

use std::collections::BTreeMap;
use std::fmt;

use metrics::counter;
use serde::{Deserialize, Serialize};

/// Stable identifier derived from the canonical URL.
pub type ItemId = String;

/// Score assigned when the scoring call yields nothing usable for an item.
pub const DEFAULT_SCORE: u8 = 5;
pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

/// Closed set of display categories, declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Agent")]
    Agent,
    #[serde(rename = "TechDepth")]
    TechDepth,
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "Industry")]
    Industry,
}

impl Category {
    /// All categories in display priority order.
    pub const ALL: [Category; 4] = [
        Category::Agent,
        Category::TechDepth,
        Category::Aws,
        Category::Industry,
    ];

    /// Assigned when no rule and no classification call yields a category.
    pub const DEFAULT: Category = Category::Industry;

    /// 1 = shown first.
    pub fn priority(self) -> u8 {
        match self {
            Self::Agent => 1,
            Self::TechDepth => 2,
            Self::Aws => 3,
            Self::Industry => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "Agent",
            Self::TechDepth => "TechDepth",
            Self::Aws => "AWS",
            Self::Industry => "Industry",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Agent => "Agent frameworks, MCP, multi-agent systems, tool use",
            Self::TechDepth => "LLMs, RAG, model optimization, algorithms and papers",
            Self::Aws => "Bedrock, SageMaker and other AWS AI services",
            Self::Industry => "Adoption, product launches, market moves",
        }
    }

    /// Lenient parse of category names as they come back from a model.
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "agent" | "agents" | "agentic" | "agent专项" => Some(Self::Agent),
            "techdepth" | "tech" | "technical" | "technology" | "技术深度" => {
                Some(Self::TechDepth)
            }
            "aws" | "awsfocus" | "aws聚焦" => Some(Self::Aws),
            "industry" | "industrynews" | "行业动态" => Some(Self::Industry),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative tier of an importance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Critical,
    Important,
    Normal,
    Low,
    Irrelevant,
}

impl ScoreBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            9.. => Self::Critical,
            7..=8 => Self::Important,
            5..=6 => Self::Normal,
            3..=4 => Self::Low,
            _ => Self::Irrelevant,
        }
    }
}

/// One curated item. Stages only add to it; summary repair is the single
/// destructive edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub id: ItemId,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub source: String,
    pub published: String,
    pub category: Category,
    pub score: u8,
    /// Tier of `score`; kept in step by whoever sets the score.
    pub band: ScoreBand,
    pub score_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_translated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_translated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_liner: Option<String>,
    /// Position at ingestion; the stable tie-break for ranking.
    #[serde(skip)]
    pub ingest_order: usize,
}

impl NewsItem {
    /// Title in the target language when available.
    pub fn display_title(&self) -> &str {
        self.title_translated.as_deref().unwrap_or(&self.title)
    }
}

/// Linear pipeline phases. A state only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ingested,
    Filtered,
    Classified,
    Scored,
    Enriched,
    Ranked,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingested => "ingested",
            Self::Filtered => "filtered",
            Self::Classified => "classified",
            Self::Scored => "scored",
            Self::Enriched => "enriched",
            Self::Ranked => "ranked",
        }
    }
}

/// Why an item was removed from the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingLink,
    AlreadyDelivered,
    DuplicateId,
    Rollup,
    LowValue,
    NearDuplicate,
    Irrelevant,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingLink => "missing_link",
            Self::AlreadyDelivered => "already_delivered",
            Self::DuplicateId => "duplicate_id",
            Self::Rollup => "rollup",
            Self::LowValue => "low_value",
            Self::NearDuplicate => "near_duplicate",
            Self::Irrelevant => "irrelevant",
        }
    }
}

/// Counted drop events for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DropLedger {
    counts: BTreeMap<DropReason, usize>,
}

impl DropLedger {
    pub fn record(&mut self, reason: DropReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
        counter!("curation_dropped_total", "reason" => reason.as_str()).increment(1);
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

}

/// Non-fatal observability signals raised during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Every returned score was the same value.
    DegenerateScores { score: u8, count: usize },
}

/// A follow-up suggested from the run's trends and top items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default, alias = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub priority: String,
}

/// A group of related items on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub topic: String,
    pub summary: String,
    pub item_ids: Vec<ItemId>,
}

/// Everything a run accumulates between ingestion and handoff.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub phase: Phase,
    pub items: Vec<NewsItem>,
    pub category_index: BTreeMap<Category, Vec<ItemId>>,
    pub trends: Vec<String>,
    pub clusters: Vec<Cluster>,
    /// Bullet lines joined by `\n`; empty when unavailable.
    pub summary: String,
    pub commentary: String,
    pub action_items: Vec<ActionItem>,
    pub headline: Vec<ItemId>,
    pub warnings: Vec<PipelineWarning>,
    pub drops: DropLedger,
}

impl PipelineState {
    pub fn new(items: Vec<NewsItem>, drops: DropLedger) -> Self {
        Self {
            phase: Phase::Ingested,
            items,
            category_index: BTreeMap::new(),
            trends: Vec::new(),
            clusters: Vec::new(),
            summary: String::new(),
            commentary: String::new(),
            action_items: Vec::new(),
            headline: Vec::new(),
            warnings: Vec::new(),
            drops,
        }
    }

    /// Move to `to`. Moving backwards is a programming error and is ignored.
    pub fn advance(&mut self, to: Phase) {
        if to < self.phase {
            tracing::error!(target: "pipeline", from = self.phase.as_str(), to = to.as_str(), "refusing to move pipeline backwards");
            return;
        }
        self.phase = to;
        counter!("curation_items_total", "phase" => to.as_str()).increment(self.items.len() as u64);
    }

    pub fn find(&self, id: &str) -> Option<&NewsItem> {
        self.items.iter().find(|it| it.id == id)
    }

    /// Rebuild the category index from the current item order.
    pub fn reindex_categories(&mut self) {
        let mut index: BTreeMap<Category, Vec<ItemId>> = BTreeMap::new();
        for it in &self.items {
            index.entry(it.category).or_default().push(it.id.clone());
        }
        self.category_index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_cover_the_documented_ranges() {
        assert_eq!(ScoreBand::from_score(10), ScoreBand::Critical);
        assert_eq!(ScoreBand::from_score(9), ScoreBand::Critical);
        assert_eq!(ScoreBand::from_score(8), ScoreBand::Important);
        assert_eq!(ScoreBand::from_score(6), ScoreBand::Normal);
        assert_eq!(ScoreBand::from_score(5), ScoreBand::Normal);
        assert_eq!(ScoreBand::from_score(4), ScoreBand::Low);
        assert_eq!(ScoreBand::from_score(2), ScoreBand::Irrelevant);
        assert_eq!(ScoreBand::from_score(1), ScoreBand::Irrelevant);
    }

    #[test]
    fn category_parse_is_lenient() {
        assert_eq!(Category::parse("TechDepth"), Some(Category::TechDepth));
        assert_eq!(Category::parse(" tech_depth "), Some(Category::TechDepth));
        assert_eq!(Category::parse("aws"), Some(Category::Aws));
        assert_eq!(Category::parse("AWS 聚焦"), Some(Category::Aws));
        assert_eq!(Category::parse("Multi-Agent"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn category_order_follows_priority() {
        let mut v = vec![Category::Industry, Category::Agent, Category::Aws, Category::TechDepth];
        v.sort();
        assert_eq!(v, Category::ALL.to_vec());
        assert!(Category::ALL.windows(2).all(|w| w[0].priority() < w[1].priority()));
    }

    #[test]
    fn ledger_counts_per_reason() {
        let mut a = DropLedger::default();
        a.record(DropReason::Rollup);
        a.record(DropReason::Rollup);
        a.record(DropReason::Irrelevant);
        assert_eq!(a.count(DropReason::Rollup), 2);
        assert_eq!(a.count(DropReason::Irrelevant), 1);
        assert_eq!(a.total(), 3);
    }

    #[test]
    fn phase_never_moves_backwards() {
        let mut st = PipelineState::new(vec![], DropLedger::default());
        st.advance(Phase::Scored);
        st.advance(Phase::Filtered);
        assert_eq!(st.phase, Phase::Scored);
    }
}

// src/config/policy.rs
//! Curation policy tables: allowlist, forced categories, keyword groups and
//! the filters applied before any paid call.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::Category;

/// Ordered keyword list for one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordGroup {
    pub category: Category,
    pub keywords: Vec<String>,
}

/// `[policy]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CurationPolicy {
    /// Sources trusted without a relevance check.
    pub allowlist: Vec<String>,
    /// Source name -> forced category.
    pub source_categories: BTreeMap<String, Category>,
    /// Checked in order; first group with a hit wins.
    pub keyword_groups: Vec<KeywordGroup>,
    pub rollup_keywords: Vec<String>,
    /// Quote/retweet markers in titles.
    pub low_value_markers: Vec<String>,
    /// Closed label vocabulary.
    pub labels: Vec<String>,
}

fn strings(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

impl Default for CurationPolicy {
    fn default() -> Self {
        let source_categories = [
            ("AWS News Blog", Category::Aws),
            ("AWS AI Blog", Category::Aws),
            ("AWS Machine Learning Blog", Category::Aws),
            ("AWS Compute Blog", Category::Aws),
            ("AWS Developer Blog", Category::Aws),
            ("CrewAI Blog", Category::Agent),
            ("Semantic Kernel Blog", Category::Agent),
            ("Anthropic News", Category::Agent),
        ]
        .into_iter()
        .map(|(s, c)| (s.to_string(), c))
        .collect();

        Self {
            allowlist: strings(&[
                "Hacker News",
                "GitHub Trending",
                "GitHub Blog",
                "Dev.to",
                "Rust Blog",
                "Python Blog",
                "AWS News Blog",
                "AWS AI Blog",
                "AWS Machine Learning Blog",
                "AWS Compute Blog",
                "AWS Developer Blog",
                "LangChain Blog",
                "LlamaIndex Blog",
                "CrewAI Blog",
                "Semantic Kernel Blog",
                "Anthropic News",
            ]),
            source_categories,
            keyword_groups: vec![
                KeywordGroup {
                    category: Category::Agent,
                    keywords: strings(&[
                        "agent",
                        "agentic",
                        "multi-agent",
                        "mcp",
                        "tool use",
                        "function call",
                    ]),
                },
                KeywordGroup {
                    category: Category::TechDepth,
                    keywords: strings(&[
                        "rag", "retrieval", "embedding", "vector", "llm", "fine-tun", "prompt",
                        "ocr", "parse", "extract",
                    ]),
                },
                KeywordGroup {
                    category: Category::Aws,
                    keywords: strings(&["aws", "bedrock", "sagemaker", "amazon"]),
                },
            ],
            rollup_keywords: strings(&["newsletter", "weekly", "roundup", "digest", "recap"]),
            low_value_markers: strings(&["quoting ", "via @", "rt @"]),
            labels: strings(&["Major", "Funding", "Launch", "OpenSource", "Research"]),
        }
    }
}

impl CurationPolicy {
    pub fn is_allowlisted(&self, source: &str) -> bool {
        let s = source.trim();
        self.allowlist.iter().any(|w| w.trim().eq_ignore_ascii_case(s))
    }

    /// Tier-1 override: category forced by source name (case-insensitive).
    pub fn forced_category(&self, source: &str) -> Option<Category> {
        let s = source.trim();
        self.source_categories
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(s))
            .map(|(_, c)| *c)
    }

    pub fn is_rollup(&self, title: &str) -> bool {
        let t = title.to_lowercase();
        self.rollup_keywords
            .iter()
            .any(|k| !k.is_empty() && t.contains(&k.to_lowercase()))
    }

    /// Quote/retweet noise, or a bare `owner/repo` title that is also the summary.
    pub fn is_low_value(&self, title: &str, summary: &str) -> bool {
        let t = title.to_lowercase();
        if self
            .low_value_markers
            .iter()
            .any(|m| !m.is_empty() && t.contains(&m.to_lowercase()))
        {
            return true;
        }
        static RE_REPO: OnceCell<Regex> = OnceCell::new();
        let re_repo = RE_REPO.get_or_init(|| Regex::new(r"^[\w.\-]+/[\w.\-]+$").unwrap());
        let title = title.trim();
        title == summary.trim() && re_repo.is_match(title)
    }

    /// Label from the vocabulary matching `raw` (case-insensitive), in canonical spelling.
    pub fn canonical_label(&self, raw: &str) -> Option<&str> {
        let r = raw.trim();
        self.labels
            .iter()
            .find(|l| l.eq_ignore_ascii_case(r))
            .map(String::as_str)
    }

    pub fn keyword_matcher(&self) -> Result<KeywordMatcher, ConfigError> {
        KeywordMatcher::new(&self.keyword_groups)
    }
}

/// Compiled keyword groups. Keywords starting with an ASCII letter or digit
/// must start at a word boundary, so `agent` hits "multi-agent" and "agents"
/// while `rag` misses "storage". Other keywords (CJK) match anywhere.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    groups: Vec<(Category, Regex)>,
}

impl KeywordMatcher {
    pub fn new(groups: &[KeywordGroup]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(groups.len());
        for g in groups {
            let alts: Vec<String> = g
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(|k| {
                    let escaped = regex::escape(k);
                    if k.starts_with(|c: char| c.is_ascii_alphanumeric()) {
                        format!(r"\b{escaped}")
                    } else {
                        escaped
                    }
                })
                .collect();
            if alts.is_empty() {
                continue;
            }
            let pattern = format!(r"(?i)(?:{})", alts.join("|"));
            let re = Regex::new(&pattern).map_err(|e| ConfigError::InvalidValue {
                key: format!("policy.keyword_groups.{}", g.category),
                message: e.to_string(),
            })?;
            compiled.push((g.category, re));
        }
        Ok(Self { groups: compiled })
    }

    /// First group (in configured order) with a hit in `title`.
    pub fn category_for(&self, title: &str) -> Option<Category> {
        self.groups
            .iter()
            .find(|(_, re)| re.is_match(title))
            .map(|(c, _)| *c)
    }
}

// src/stages/classify.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{payload, CallContext, Reply, Stage};
use crate::config::{CurationPolicy, KeywordMatcher};
use crate::error::ConfigError;
use crate::generation::parse::{parse_object, WireId};
use crate::generation::{CallSite, GenerationRequest};
use crate::model::{Category, Phase, PipelineState};

fn system_prompt() -> String {
    let cats: Vec<String> = Category::ALL
        .iter()
        .map(|c| format!("- {}: {}", c.as_str(), c.description()))
        .collect();
    format!(
        "Assign each news item to exactly one category:\n{}\n\
         Input is a JSON array of items with an `id`. \
         Reply with JSON only, mapping category name to a list of ids, e.g. \
         {{\"Agent\": [\"id1\"], \"TechDepth\": [], \"AWS\": [], \"Industry\": [\"id2\"]}}.",
        cats.join("\n")
    )
}

/// Exactly one category per item: forced source, then keywords, then a
/// model call for what is left, then the default.
pub struct Classifier {
    ctx: CallContext,
    policy: Arc<CurationPolicy>,
    matcher: KeywordMatcher,
}

impl Classifier {
    pub fn new(ctx: CallContext, policy: Arc<CurationPolicy>) -> Result<Self, ConfigError> {
        let matcher = policy.keyword_matcher()?;
        Ok(Self {
            ctx,
            policy,
            matcher,
        })
    }

    /// Tiers 1 and 2. `None` means the item needs the model.
    fn rule_category(&self, source: &str, title: &str) -> Option<Category> {
        self.policy
            .forced_category(source)
            .or_else(|| self.matcher.category_for(title))
    }
}

/// Highest-priority category per id. Unknown category names are ignored.
fn resolve_assignments(raw: HashMap<String, Vec<WireId>>) -> HashMap<String, Category> {
    let mut best: HashMap<String, Category> = HashMap::new();
    for (name, ids) in raw {
        let Some(cat) = Category::parse(&name) else {
            tracing::debug!(target: "classify", category = %name, "ignoring unknown category");
            continue;
        };
        for id in ids {
            best.entry(id.into_key())
                .and_modify(|c| {
                    if cat.priority() < c.priority() {
                        *c = cat;
                    }
                })
                .or_insert(cat);
        }
    }
    best
}

#[async_trait]
impl Stage for Classifier {
    fn name(&self) -> &'static str {
        "classify"
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let mut unresolved: Vec<usize> = Vec::new();
        let mut by_rule = 0usize;
        for (idx, it) in state.items.iter_mut().enumerate() {
            match self.rule_category(&it.source, &it.title) {
                Some(cat) => {
                    it.category = cat;
                    by_rule += 1;
                }
                None => unresolved.push(idx),
            }
        }

        let mut by_model = 0usize;
        if !unresolved.is_empty() {
            let entries = unresolved
                .iter()
                .map(|&i| self.ctx.item_entry(&state.items[i]))
                .collect();
            let req = GenerationRequest::new(CallSite::Classify, system_prompt(), payload(entries));
            let assigned = match self
                .ctx
                .ask(req, parse_object::<HashMap<String, Vec<WireId>>>)
                .await
            {
                Reply::Parsed(raw) => resolve_assignments(raw),
                Reply::Fallback(cause) => {
                    tracing::info!(target: "classify", unresolved = unresolved.len(), ?cause, "classification unavailable; using default category");
                    HashMap::new()
                }
            };
            for &i in &unresolved {
                let it = &mut state.items[i];
                it.category = match assigned.get(&it.id) {
                    Some(&cat) => {
                        by_model += 1;
                        cat
                    }
                    None => Category::DEFAULT,
                };
            }
        }

        state.reindex_categories();
        tracing::info!(
            target: "classify",
            by_rule,
            by_model,
            by_default = unresolved.len() - by_model,
            "classification finished"
        );
        state.advance(Phase::Classified);
        state
    }
}

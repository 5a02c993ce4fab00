// src/stages/relevance.rs
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{payload, CallContext, Reply, Stage};
use crate::config::CurationPolicy;
use crate::generation::parse::{parse_object, WireId};
use crate::generation::{CallSite, GenerationRequest};
use crate::model::{DropReason, Phase, PipelineState};

const SYSTEM: &str = "You screen news items for a technical AI digest. \
Relevant: AI, LLMs, agents, developer tooling, cloud AI services, notable AI industry news. \
Not relevant: unrelated topics, pure marketing, personal posts. \
Input is a JSON array of items with an `id`. \
Reply with JSON only: {\"relevant_ids\": [ids], \"filtered_ids\": [ids]}. \
Every input id must appear in exactly one list.";

#[derive(Debug, Deserialize)]
struct RelevanceReply {
    relevant_ids: Vec<WireId>,
    #[serde(default)]
    filtered_ids: Vec<WireId>,
}

/// Drops items a model judges irrelevant. Allowlisted sources skip the check
/// and any failure keeps every item.
pub struct RelevanceFilter {
    ctx: CallContext,
    policy: Arc<CurationPolicy>,
}

impl RelevanceFilter {
    pub fn new(ctx: CallContext, policy: Arc<CurationPolicy>) -> Self {
        Self { ctx, policy }
    }
}

#[async_trait]
impl Stage for RelevanceFilter {
    fn name(&self) -> &'static str {
        "relevance"
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        let entries: Vec<_> = state
            .items
            .iter()
            .filter(|it| !self.policy.is_allowlisted(&it.source))
            .map(|it| self.ctx.item_entry(it))
            .collect();
        let checked = entries.len();
        let allowlisted = state.items.len() - checked;

        if checked == 0 {
            tracing::info!(target: "relevance", allowlisted, "all items allowlisted; no call made");
            state.advance(Phase::Filtered);
            return state;
        }

        let checked_ids: HashSet<String> = entries
            .iter()
            .filter_map(|e| e.get("id").and_then(|v| v.as_str()).map(str::to_string))
            .collect();

        let req = GenerationRequest::new(CallSite::Relevance, SYSTEM, payload(entries));
        let to_drop: HashSet<String> = match self.ctx.ask(req, parse_object::<RelevanceReply>).await {
            Reply::Parsed(reply) => {
                let relevant: HashSet<String> =
                    reply.relevant_ids.into_iter().map(WireId::into_key).collect();
                reply
                    .filtered_ids
                    .into_iter()
                    .map(WireId::into_key)
                    .filter(|id| checked_ids.contains(id) && !relevant.contains(id))
                    .collect()
            }
            Reply::Fallback(cause) => {
                tracing::info!(target: "relevance", checked, ?cause, "relevance check unavailable; keeping all items");
                HashSet::new()
            }
        };

        state.items.retain(|it| !to_drop.contains(&it.id));
        for _ in 0..to_drop.len() {
            state.drops.record(DropReason::Irrelevant);
        }

        tracing::info!(
            target: "relevance",
            allowlisted,
            checked,
            dropped = to_drop.len(),
            kept = state.items.len(),
            "relevance filter finished"
        );
        state.advance(Phase::Filtered);
        state
    }
}

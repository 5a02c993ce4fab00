// src/stages/score.rs
use std::collections::HashMap;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use super::{payload, CallContext, Reply, Stage};
use crate::generation::parse::{parse_array_lenient, WireId, WireScore};
use crate::generation::{CallSite, GenerationRequest};
use crate::model::{Phase, PipelineState, PipelineWarning, ScoreBand, DEFAULT_SCORE};
use crate::text::sanitize_line;

const REASON_MAX_CHARS: usize = 200;

const SYSTEM: &str = "Rate the importance of each news item for AI practitioners on a 1-10 scale. \
9-10: critical, industry-changing. 7-8: important. 5-6: normal. 3-4: low. 1-2: irrelevant. \
Use the full range. Input is a JSON array of items with an `id`. \
Reply with JSON only: [{\"id\": \"...\", \"score\": 7, \"reason\": \"one short sentence\"}].";

#[derive(Debug, Deserialize)]
struct ScoreEntry {
    id: WireId,
    #[serde(default)]
    score: Option<WireScore>,
    #[serde(default)]
    reason: Option<String>,
}

/// Importance score 1..=10 plus a short rationale for every item.
pub struct Scorer {
    ctx: CallContext,
}

impl Scorer {
    pub fn new(ctx: CallContext) -> Self {
        Self { ctx }
    }
}

/// `(score, count)` when every valid score is the same value; all-equal
/// output from a model usually means it ignored the scale.
fn degenerate(valid: &[u8]) -> Option<(u8, usize)> {
    let (&first, rest) = valid.split_first()?;
    if !rest.is_empty() && rest.iter().all(|&s| s == first) {
        Some((first, valid.len()))
    } else {
        None
    }
}

#[async_trait]
impl Stage for Scorer {
    fn name(&self) -> &'static str {
        "score"
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        if state.items.is_empty() {
            state.advance(Phase::Scored);
            return state;
        }

        let entries = state
            .items
            .iter()
            .map(|it| {
                let mut e = self.ctx.item_entry(it);
                e["category"] = it.category.as_str().into();
                e
            })
            .collect();
        let req = GenerationRequest::new(CallSite::Score, SYSTEM, payload(entries));

        // id -> (score, reason); first valid entry per id wins
        let mut scored: HashMap<String, (u8, String)> = HashMap::new();
        match self.ctx.ask(req, parse_array_lenient::<ScoreEntry>).await {
            Reply::Parsed(list) => {
                for e in list {
                    let Some(score) = e.score.as_ref().and_then(WireScore::to_score) else {
                        continue;
                    };
                    let reason = e.reason.as_deref().map(|r| sanitize_line(r, REASON_MAX_CHARS));
                    scored
                        .entry(e.id.into_key())
                        .or_insert((score, reason.unwrap_or_default()));
                }
            }
            Reply::Fallback(cause) => {
                tracing::info!(target: "score", items = state.items.len(), ?cause, "scoring unavailable; using default score");
            }
        }

        let mut valid: Vec<u8> = Vec::new();
        for it in state.items.iter_mut() {
            match scored.remove(&it.id) {
                Some((score, reason)) => {
                    valid.push(score);
                    it.score = score;
                    it.band = ScoreBand::from_score(score);
                    it.score_reason = reason;
                }
                None => {
                    it.score = DEFAULT_SCORE;
                    it.band = ScoreBand::from_score(DEFAULT_SCORE);
                    it.score_reason = String::new();
                }
            }
        }

        if let Some((score, count)) = degenerate(&valid) {
            tracing::warn!(target: "score", score, count, "every returned score is identical");
            counter!("curation_degenerate_output_total").increment(1);
            state
                .warnings
                .push(PipelineWarning::DegenerateScores { score, count });
        }

        tracing::info!(
            target: "score",
            items = state.items.len(),
            scored = valid.len(),
            defaulted = state.items.len() - valid.len(),
            "scoring finished"
        );
        state.advance(Phase::Scored);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_needs_two_equal_scores() {
        assert_eq!(degenerate(&[]), None);
        assert_eq!(degenerate(&[7]), None);
        assert_eq!(degenerate(&[7, 8]), None);
        assert_eq!(degenerate(&[6, 6, 6]), Some((6, 3)));
    }
}

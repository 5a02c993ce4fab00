// src/stages/rank.rs
use std::cmp::Reverse;

use async_trait::async_trait;

use super::Stage;
use crate::model::{Phase, PipelineState};

/// Final ordering: score descending, ingestion order on ties.
pub struct Ranker {
    headline_size: usize,
}

impl Ranker {
    pub fn new(headline_size: usize) -> Self {
        Self { headline_size }
    }
}

/// Sort in place and select the headline subset.
pub fn rank(state: &mut PipelineState, headline_size: usize) {
    state
        .items
        .sort_by_key(|it| (Reverse(it.score), it.ingest_order));
    state.headline = state
        .items
        .iter()
        .take(headline_size)
        .map(|it| it.id.clone())
        .collect();
    // Rebuilt from ranked order; categories without items have no entry.
    state.reindex_categories();
}

#[async_trait]
impl Stage for Ranker {
    fn name(&self) -> &'static str {
        "rank"
    }

    async fn run(&self, mut state: PipelineState) -> PipelineState {
        rank(&mut state, self.headline_size);
        tracing::info!(
            target: "rank",
            items = state.items.len(),
            headline = state.headline.len(),
            categories = state.category_index.len(),
            "ranking finished"
        );
        state.advance(Phase::Ranked);
        state
    }
}

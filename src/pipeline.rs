// src/pipeline.rs
//! Ordered list of stages applied to one run's state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::CurationConfig;
use crate::error::{ConfigError, PipelineError};
use crate::generation::DynGenerator;
use crate::handoff::CuratedDigest;
use crate::ingest::{ingest, types::RawRecord};
use crate::model::{ItemId, Phase, PipelineState};
use crate::stages::{
    CallContext, Classifier, Enricher, Insights, Ranker, RelevanceFilter, Scorer, Stage,
};

pub struct Pipeline {
    config: Arc<CurationConfig>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// relevance -> classify -> score -> enrich -> insights -> rank
    pub fn standard(config: CurationConfig, generator: DynGenerator) -> Result<Self, ConfigError> {
        let ctx = CallContext {
            generator,
            timeout: config.generation.timeout(),
            max_concurrency: config.pipeline.max_concurrency.max(1),
            payload_summary_chars: config.pipeline.payload_summary_chars,
            target_language: config.generation.target_language.clone(),
        };
        let policy = Arc::new(config.policy.clone());
        let p = &config.pipeline;

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(RelevanceFilter::new(ctx.clone(), policy.clone())),
            Box::new(Classifier::new(ctx.clone(), policy.clone())?),
            Box::new(Scorer::new(ctx.clone())),
            Box::new(Enricher::new(ctx.clone(), policy, p)),
            Box::new(Insights::new(ctx, p)),
            Box::new(Ranker::new(p.headline_size)),
        ];
        Ok(Self::with_stages(config, stages))
    }

    pub fn with_stages(config: CurationConfig, stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            config: Arc::new(config),
            stages,
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Ingest `records` and run every stage. Fails only when nothing survives
    /// ingestion; every later problem resolves to a stage fallback.
    pub async fn run(
        &self,
        records: Vec<RawRecord>,
        delivered: &HashSet<ItemId>,
    ) -> Result<CuratedDigest, PipelineError> {
        let started = Instant::now();
        let received = records.len();
        let (items, drops) = ingest(
            records,
            delivered,
            &self.config.policy,
            self.config.pipeline.near_duplicate_threshold,
        );
        if items.is_empty() {
            tracing::error!(target: "pipeline", received, dropped = drops.total(), "no items survived ingestion");
            return Err(PipelineError::NoItemsAfterIngest { received });
        }

        let mut state = PipelineState::new(items, drops);
        state.advance(Phase::Ingested);

        for stage in &self.stages {
            let t = Instant::now();
            state = stage.run(state).await;
            tracing::info!(
                target: "pipeline",
                stage = stage.name(),
                phase = state.phase.as_str(),
                items = state.items.len(),
                elapsed_ms = t.elapsed().as_millis() as u64,
                "stage finished"
            );
        }

        crate::metrics::mark_run_finished();
        tracing::info!(
            target: "pipeline",
            received,
            items = state.items.len(),
            dropped = state.drops.total(),
            warnings = state.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(CuratedDigest::from_state(state, Utc::now()))
    }
}

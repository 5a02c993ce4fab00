// src/stages/mod.rs
//! Pipeline stages. Each one is total over its input: a failed or unparseable
//! call resolves to the stage's documented fallback, never to an error.

pub mod classify;
pub mod enrich;
pub mod insights;
pub mod rank;
pub mod relevance;
pub mod score;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde_json::Value;

use crate::error::GenerationError;
use crate::generation::{invoke, CallSite, DynGenerator, GenerationRequest, ParseOutcome};
use crate::model::{NewsItem, PipelineState};
use crate::text::truncate_chars;

pub use classify::Classifier;
pub use enrich::Enricher;
pub use insights::Insights;
pub use rank::Ranker;
pub use relevance::RelevanceFilter;
pub use score::Scorer;

/// One step of the pipeline: `PipelineState -> PipelineState`.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, state: PipelineState) -> PipelineState;
}

/// Why a call resolved to its fallback.
#[derive(Debug, Clone)]
pub enum FallbackCause {
    Generation(GenerationError),
    Parse { reason: String },
}

/// Outcome of one call as seen by a stage.
#[derive(Debug)]
pub enum Reply<T> {
    Parsed(T),
    Fallback(FallbackCause),
}

impl<T> Reply<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Parsed(v) => Some(v),
            Self::Fallback(_) => None,
        }
    }
}

/// What every calling stage needs: the generator and the call budget.
#[derive(Clone)]
pub struct CallContext {
    pub generator: DynGenerator,
    pub timeout: Duration,
    pub max_concurrency: usize,
    /// Summary prefix length sent in payloads.
    pub payload_summary_chars: usize,
    pub target_language: String,
}

impl CallContext {
    /// Issue one call and parse its response. Parse failures are logged and
    /// counted apart from transport failures.
    pub async fn ask<T, P>(&self, req: GenerationRequest, parse: P) -> Reply<T>
    where
        P: FnOnce(&str) -> ParseOutcome<T>,
    {
        let raw = match invoke(self.generator.as_ref(), &req, self.timeout).await {
            Ok(raw) => raw,
            Err(e) => return Reply::Fallback(FallbackCause::Generation(e)),
        };
        match parse(&raw) {
            ParseOutcome::Parsed(v) => Reply::Parsed(v),
            ParseOutcome::ParseFailed { raw, reason } => {
                counter!("generation_parse_failures_total", "call" => req.call.as_str()).increment(1);
                tracing::warn!(
                    target: "generation",
                    call = req.call.as_str(),
                    %reason,
                    "unparseable response; using fallback"
                );
                tracing::debug!(target: "generation", call = req.call.as_str(), raw = %raw, "raw response");
                Reply::Fallback(FallbackCause::Parse { reason })
            }
        }
    }

    /// One call per batch with at most `max_concurrency` in flight.
    /// Results keep batch order; a failed batch yields `None`.
    pub async fn ask_batches<T, P>(
        &self,
        call: CallSite,
        system: &str,
        batches: Vec<Vec<Value>>,
        parse: P,
    ) -> Vec<Option<T>>
    where
        P: Fn(&str) -> ParseOutcome<T> + Copy,
    {
        stream::iter(batches)
            .map(|batch| {
                let req = GenerationRequest::new(call, system, payload(batch));
                async move { self.ask(req, parse).await.ok() }
            })
            .buffered(self.max_concurrency.max(1))
            .collect()
            .await
    }

    /// Payload-sized summary prefix.
    pub fn excerpt(&self, text: &str) -> String {
        truncate_chars(text, self.payload_summary_chars)
    }

    /// The common `{id, title, summary, source}` payload entry.
    pub fn item_entry(&self, it: &NewsItem) -> Value {
        serde_json::json!({
            "id": it.id,
            "title": it.title,
            "summary": self.excerpt(&it.summary),
            "source": it.source,
        })
    }
}

/// Batch payload: a JSON array of entries.
pub fn payload(entries: Vec<Value>) -> String {
    Value::Array(entries).to_string()
}

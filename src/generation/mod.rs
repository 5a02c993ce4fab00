// src/generation/mod.rs
//! Text generation: provider abstraction, call wrapper and response parsing.
//!
//! Stages never talk to a provider directly. They go through [`invoke`], which
//! enforces the per-call timeout and records call/failure metrics, and then
//! parse the raw text with [`parse`].

pub mod openai;
pub mod parse;
pub mod scripted;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;

use crate::config::generation::GenerationConfig;
use crate::error::{ConfigError, GenerationError};

pub use openai::OpenAiGenerator;
pub use parse::ParseOutcome;
pub use scripted::ScriptedGenerator;

/// Which stage issued a call. Used for metrics labels, logs and scripted responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallSite {
    Relevance,
    Classify,
    Score,
    RepairSummary,
    Translate,
    Label,
    Trends,
    Clusters,
    Summary,
    ActionItems,
    Commentary,
}

impl CallSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Classify => "classify",
            Self::Score => "score",
            Self::RepairSummary => "repair_summary",
            Self::Translate => "translate",
            Self::Label => "label",
            Self::Trends => "trends",
            Self::Clusters => "clusters",
            Self::Summary => "summary",
            Self::ActionItems => "action_items",
            Self::Commentary => "commentary",
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call: system instructions plus the batch payload as a JSON array.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub call: CallSite,
    pub system: String,
    pub user: String,
}

impl GenerationRequest {
    pub fn new(call: CallSite, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            call,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Anything that turns a request into raw response text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> Result<String, GenerationError>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynGenerator = Arc<dyn TextGenerator>;

/// Always fails with `GenerationError::Disabled`; every stage falls back.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _req: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Run one call under a hard timeout and record its outcome.
pub async fn invoke(
    generator: &dyn TextGenerator,
    req: &GenerationRequest,
    timeout: Duration,
) -> Result<String, GenerationError> {
    crate::metrics::ensure_described();
    counter!("generation_calls_total", "call" => req.call.as_str()).increment(1);

    let started = Instant::now();
    let res = match tokio::time::timeout(timeout, generator.generate(req)).await {
        Ok(r) => r,
        Err(_) => Err(GenerationError::Timeout {
            call: req.call,
            after: timeout,
        }),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &res {
        Ok(text) => {
            tracing::debug!(
                target: "generation",
                call = req.call.as_str(),
                provider = generator.provider_name(),
                elapsed_ms,
                response_chars = text.chars().count(),
                "generation call ok"
            );
        }
        Err(GenerationError::Disabled) => {
            counter!("generation_failures_total", "call" => req.call.as_str(), "kind" => "disabled")
                .increment(1);
            tracing::debug!(target: "generation", call = req.call.as_str(), "generation disabled; using fallback");
        }
        Err(e) => {
            counter!("generation_failures_total", "call" => req.call.as_str(), "kind" => e.kind())
                .increment(1);
            tracing::warn!(
                target: "generation",
                call = req.call.as_str(),
                provider = generator.provider_name(),
                elapsed_ms,
                retryable = e.is_retryable(),
                error = %e,
                "generation call failed; using fallback"
            );
        }
    }
    res
}

/// Factory: build a generator according to `[generation]`.
///
/// * `openai`   - OpenAI-compatible chat completions (key must be resolved).
/// * `mock`     - deterministic offline responses.
/// * `disabled` - every call fails and every stage uses its fallback.
pub fn build_generator(cfg: &GenerationConfig) -> Result<DynGenerator, ConfigError> {
    match cfg.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGenerator::new(cfg)?)),
        "mock" => Ok(Arc::new(ScriptedGenerator::offline())),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => Err(ConfigError::InvalidValue {
            key: "generation.provider".into(),
            message: format!("unsupported provider `{other}`"),
        }),
    }
}

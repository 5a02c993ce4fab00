// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod generation;
pub mod handoff;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod stages;
pub mod text;

// ---- Re-exports for stable public API ----
pub use crate::config::{CurationConfig, CurationPolicy};
pub use crate::error::{ConfigError, DeliveryError, GenerationError, PipelineError};
pub use crate::generation::{
    build_generator, CallSite, DisabledGenerator, DynGenerator, GenerationRequest,
    ScriptedGenerator, TextGenerator,
};
pub use crate::handoff::{deliver, CuratedDigest, DeliveredStore, Renderer};
pub use crate::ingest::types::{RawRecord, SourceProvider};
pub use crate::model::{Category, NewsItem, PipelineState, ScoreBand, DEFAULT_SCORE};
pub use crate::pipeline::Pipeline;

//! Error types for the curation pipeline.
//!
//! Only `PipelineError` aborts a run. Generation failures stay inside the
//! stage that issued the call and resolve to that stage's fallback.

use std::time::Duration;

use crate::generation::CallSite;

/// Failure of a single text-generation call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("{call} call timed out after {after:?}")]
    Timeout { call: CallSite, after: Duration },

    #[error("{call} call failed: {reason}")]
    Transport { call: CallSite, reason: String },

    #[error("text generation is disabled")]
    Disabled,
}

impl GenerationError {
    /// Timeouts and transport errors may succeed on a later run; `Disabled` never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::Disabled => "disabled",
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal preconditions. Raised before any delivery side effect.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no items survived ingestion ({received} records received)")]
    NoItemsAfterIngest { received: usize },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Handoff failures. A failed render means nothing is persisted.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("renderer failed: {0:#}")]
    Render(anyhow::Error),

    #[error("delivered-set persistence failed: {0:#}")]
    Persist(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let t = GenerationError::Timeout {
            call: CallSite::Score,
            after: Duration::from_secs(3),
        };
        assert!(t.is_retryable());
        assert_eq!(t.kind(), "timeout");
        assert!(!GenerationError::Disabled.is_retryable());
        assert!(t.to_string().contains("score"));
    }
}

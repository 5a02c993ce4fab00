// src/config/mod.rs
//! Run configuration loaded from TOML.
//!
//! Resolution order:
//! 1) $CURATOR_CONFIG_PATH (must exist)
//! 2) config/curation.toml
//! 3) built-in defaults

pub mod generation;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
pub use generation::GenerationConfig;
pub use policy::{CurationPolicy, KeywordGroup, KeywordMatcher};

pub const ENV_CONFIG_PATH: &str = "CURATOR_CONFIG_PATH";
pub const ENV_MAX_CONCURRENCY: &str = "CURATOR_MAX_CONCURRENCY";
pub const DEFAULT_CONFIG_PATH: &str = "config/curation.toml";

/// `[pipeline]` section: batch sizes, limits and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Items per summary-repair and translation call.
    pub enrich_batch_size: usize,
    /// Items per label/one-liner call.
    pub label_batch_size: usize,
    /// Concurrent calls within one stage.
    pub max_concurrency: usize,
    pub headline_size: usize,
    /// Summaries shorter than this (in chars) get repaired.
    pub min_summary_chars: usize,
    /// Normalized Levenshtein similarity at which two titles count as one.
    /// Values >= 1.0 disable the check.
    pub near_duplicate_threshold: f64,
    pub insights: bool,
    /// Top-N items fed to the trends call.
    pub trend_pool: usize,
    pub max_trends: usize,
    /// Top-N items fed to the clusters call.
    pub cluster_pool: usize,
    /// Summary prefix length sent in request payloads.
    pub payload_summary_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrich_batch_size: 10,
            label_batch_size: 30,
            max_concurrency: 4,
            headline_size: 10,
            min_summary_chars: 50,
            near_duplicate_threshold: 0.98,
            insights: true,
            trend_pool: 15,
            max_trends: 5,
            cluster_pool: 20,
            payload_summary_chars: 200,
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// JSON files with raw records, one source provider each.
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub delivered: PathBuf,
    /// Prometheus exposition text written after the run, if set.
    pub metrics: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            inputs: vec![PathBuf::from("data/records.json")],
            output: PathBuf::from("out/digest.json"),
            delivered: PathBuf::from("data/delivered.json"),
            metrics: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CurationConfig {
    pub pipeline: PipelineConfig,
    pub generation: GenerationConfig,
    pub policy: CurationPolicy,
    pub paths: PathsConfig,
}

impl CurationConfig {
    /// Parse TOML text without env overrides or key resolution.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from an explicit path, apply env overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&content)?;
        cfg.finish()?;
        tracing::info!(target: "pipeline", path = %path.display(), "configuration loaded");
        Ok(cfg)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(&p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(ConfigError::InvalidValue {
                key: ENV_CONFIG_PATH.into(),
                message: format!("points to non-existent path {p}"),
            });
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        tracing::info!(target: "pipeline", "no configuration file found; using defaults");
        let mut cfg = Self::default();
        cfg.finish()?;
        Ok(cfg)
    }

    fn finish(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides()?;
        self.validate()?;
        self.generation.resolve()
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var(ENV_MAX_CONCURRENCY) {
            self.pipeline.max_concurrency =
                v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_MAX_CONCURRENCY.into(),
                    message: format!("expected a positive integer, got `{v}`"),
                })?;
        }
        Ok(())
    }

    /// Clamp zero sizes to 1 and reject malformed thresholds or keyword tables.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let p = &mut self.pipeline;
        for v in [
            &mut p.enrich_batch_size,
            &mut p.label_batch_size,
            &mut p.max_concurrency,
            &mut p.headline_size,
            &mut p.trend_pool,
            &mut p.cluster_pool,
        ] {
            if *v == 0 {
                *v = 1;
            }
        }
        if p.near_duplicate_threshold.is_nan() || p.near_duplicate_threshold < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.near_duplicate_threshold".into(),
                message: format!("must be non-negative, got {}", p.near_duplicate_threshold),
            });
        }
        self.policy.keyword_matcher()?;
        Ok(())
    }
}

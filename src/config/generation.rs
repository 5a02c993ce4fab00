// src/config/generation.rs
use serde::{Deserialize, Serialize};
use std::{env, time::Duration};

use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

fn default_provider() -> String {
    "disabled".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_target_language() -> String {
    "Simplified Chinese".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// "openai" | "disabled" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Language translations and one-liners are written in.
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            target_language: default_target_language(),
        }
    }
}

impl GenerationConfig {
    /// Hard per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Normalize provider, resolve the API key and sanitize numeric knobs.
    pub fn resolve(&mut self) -> Result<(), ConfigError> {
        self.provider = self.provider.trim().to_lowercase();
        if !matches!(self.provider.as_str(), "openai" | "disabled" | "mock") {
            return Err(ConfigError::InvalidValue {
                key: "generation.provider".into(),
                message: format!("unsupported provider `{}`", self.provider),
            });
        }

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = if self.provider == "openai" {
                env::var(API_KEY_ENV).map_err(|_| ConfigError::MissingEnvVar(API_KEY_ENV.into()))?
            } else {
                env::var(API_KEY_ENV).unwrap_or_default()
            };
        }
        if self.provider == "openai" && self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar(API_KEY_ENV.into()));
        }

        if self.timeout_secs == 0 {
            self.timeout_secs = 1;
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = 1;
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        if self.target_language.trim().is_empty() {
            self.target_language = default_target_language();
        }
        Ok(())
    }
}

// src/generation/openai.rs
//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, TextGenerator};
use crate::config::generation::GenerationConfig;
use crate::error::{ConfigError, GenerationError};

pub struct OpenAiGenerator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiGenerator {
    /// Expects a resolved config: `api_key` must already hold the real key.
    pub fn new(cfg: &GenerationConfig) -> Result<Self, ConfigError> {
        if cfg.api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".into()));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-curator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "generation".into(),
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            timeout: cfg.timeout(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, req: &GenerationRequest) -> Result<String, GenerationError> {
        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &req.system,
                },
                Msg {
                    role: "user",
                    content: &req.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let transport = |reason: String| GenerationError::Transport {
            call: req.call,
            reason,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        call: req.call,
                        after: self.timeout,
                    }
                } else {
                    transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(transport(format!("HTTP {status}")));
        }

        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| transport(format!("invalid completion body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| transport("empty completion".into()))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_key() {
        let cfg = GenerationConfig {
            provider: "openai".into(),
            api_key: "  ".into(),
            ..GenerationConfig::default()
        };
        assert!(matches!(
            OpenAiGenerator::new(&cfg),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let cfg = GenerationConfig {
            provider: "openai".into(),
            api_key: "sk-test".into(),
            base_url: "http://localhost:8080/v1/".into(),
            ..GenerationConfig::default()
        };
        let g = OpenAiGenerator::new(&cfg).unwrap();
        assert_eq!(g.endpoint, "http://localhost:8080/v1/chat/completions");
    }
}

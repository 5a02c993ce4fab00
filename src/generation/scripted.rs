// src/generation/scripted.rs
//! Deterministic generator with fixed per-call-site responses.
//! Backs `provider = "mock"` and the test suite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{CallSite, GenerationRequest, TextGenerator};
use crate::error::GenerationError;

type Responder = Arc<dyn Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync>;

/// Responds from a table keyed by call site. Unscripted call sites fail with
/// `GenerationError::Disabled`, so the stage falls back.
#[derive(Clone)]
pub struct ScriptedGenerator {
    name: &'static str,
    responders: HashMap<CallSite, Responder>,
    calls: Arc<Mutex<Vec<CallSite>>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            name: "scripted",
            responders: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer `call` with `response`.
    pub fn on(self, call: CallSite, response: impl Into<String>) -> Self {
        let response = response.into();
        self.on_fn(call, move |_| Ok(response.clone()))
    }

    /// Always fail `call` with `err`.
    pub fn fail(self, call: CallSite, err: GenerationError) -> Self {
        self.on_fn(call, move |_| Err(err.clone()))
    }

    /// Answer `call` by inspecting the request.
    pub fn on_fn<F>(mut self, call: CallSite, f: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        self.responders.insert(call, Arc::new(f));
        self
    }

    /// Call sites in the order they were invoked.
    pub fn calls(&self) -> Vec<CallSite> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, call: CallSite) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    /// Offline responses for local runs: everything is relevant, scores vary
    /// with batch position, no categories, labels or translations. Summary,
    /// commentary and action items are left unscripted and fall back.
    pub fn offline() -> Self {
        let mut g = Self::new()
            .on_fn(CallSite::Relevance, |req| {
                let ids = payload_ids(&req.user);
                Ok(json!({ "relevant_ids": ids, "filtered_ids": [] }).to_string())
            })
            .on(CallSite::Classify, "{}")
            .on_fn(CallSite::Score, |req| {
                let scored: Vec<Value> = payload_ids(&req.user)
                    .into_iter()
                    .enumerate()
                    .map(|(i, id)| json!({ "id": id, "score": 4 + (i % 6), "reason": "offline" }))
                    .collect();
                Ok(Value::Array(scored).to_string())
            })
            .on(CallSite::RepairSummary, "[]")
            .on(CallSite::Translate, "[]")
            .on(CallSite::Label, r#"{"labels": {}, "oneliners": {}}"#)
            .on(CallSite::Trends, "[]")
            .on(CallSite::Clusters, "[]");
        g.name = "mock";
        g
    }
}

/// Ids from a batch payload (`[{"id": ...}, ...]`).
pub fn payload_ids(user: &str) -> Vec<String> {
    serde_json::from_str::<Vec<Value>>(user)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, req: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req.call);
        match self.responders.get(&req.call) {
            Some(responder) => responder(req),
            None => Err(GenerationError::Disabled),
        }
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

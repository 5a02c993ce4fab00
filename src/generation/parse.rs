// src/generation/parse.rs
//! Tolerant extraction of JSON payloads from model output.
//!
//! Model responses often wrap the JSON in prose or code fences. We cut from the
//! first opening bracket of the expected kind to the last closing one, parse,
//! and retry once with typographic quotes normalized.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::text::truncate_chars;

const RAW_KEEP_CHARS: usize = 500;

/// Tagged result of parsing a response against a call-site schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    ParseFailed { raw: String, reason: String },
}

impl<T> ParseOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Parsed(v) => Some(v),
            Self::ParseFailed { .. } => None,
        }
    }

    fn failed(raw: &str, reason: impl Into<String>) -> Self {
        Self::ParseFailed {
            raw: truncate_chars(raw, RAW_KEEP_CHARS),
            reason: reason.into(),
        }
    }
}

/// Free-text response: trimmed, and a failure when nothing is left.
pub fn parse_text(raw: &str) -> ParseOutcome<String> {
    let text = raw.trim();
    if text.is_empty() {
        ParseOutcome::failed(raw, "empty response")
    } else {
        ParseOutcome::Parsed(text.to_string())
    }
}

/// Parse the outermost `{...}` in `raw`.
pub fn parse_object<T: DeserializeOwned>(raw: &str) -> ParseOutcome<T> {
    parse_bracketed(raw, '{', '}')
}

/// Parse the outermost `[...]` in `raw`.
pub fn parse_array<T: DeserializeOwned>(raw: &str) -> ParseOutcome<T> {
    parse_bracketed(raw, '[', ']')
}

/// Parse the outermost array and keep only the entries that match `T`.
///
/// One malformed entry does not sink the whole batch.
pub fn parse_array_lenient<T: DeserializeOwned>(raw: &str) -> ParseOutcome<Vec<T>> {
    match parse_array::<Vec<serde_json::Value>>(raw) {
        ParseOutcome::Parsed(values) => {
            let total = values.len();
            let kept: Vec<T> = values
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect();
            if kept.len() < total {
                tracing::debug!(
                    target: "generation",
                    total,
                    kept = kept.len(),
                    "skipped malformed array entries"
                );
            }
            ParseOutcome::Parsed(kept)
        }
        ParseOutcome::ParseFailed { raw, reason } => ParseOutcome::ParseFailed { raw, reason },
    }
}

fn parse_bracketed<T: DeserializeOwned>(raw: &str, open: char, close: char) -> ParseOutcome<T> {
    let Some(slice) = extract_span(raw, open, close) else {
        return ParseOutcome::failed(raw, format!("no `{open}...{close}` span in response"));
    };

    let first_err = match serde_json::from_str::<T>(slice) {
        Ok(v) => return ParseOutcome::Parsed(v),
        Err(e) => e,
    };

    let normalized = normalize_quotes(slice);
    if normalized != slice {
        if let Ok(v) = serde_json::from_str::<T>(&normalized) {
            return ParseOutcome::Parsed(v);
        }
    }
    ParseOutcome::failed(raw, first_err.to_string())
}

fn extract_span(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&raw[start..end + close.len_utf8()])
}

/// Map curly double quotes to `"` and curly single quotes to `'`.
fn normalize_quotes(s: &str) -> String {
    s.replace(['\u{201C}', '\u{201D}', '\u{201E}', '\u{FF02}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Item id as returned by a model: string or bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Int(i64),
}

impl WireId {
    pub fn into_key(self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Int(n) => n.to_string(),
        }
    }
}

/// Score as returned by a model: integer, float or numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireScore {
    Int(i64),
    Float(f64),
    Text(String),
}

impl WireScore {
    /// Rounded score, or `None` when it is not a number in 1..=10.
    pub fn to_score(&self) -> Option<u8> {
        let v = match self {
            Self::Int(n) => *n as f64,
            Self::Float(f) => *f,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        if !v.is_finite() {
            return None;
        }
        let r = v.round();
        if (f64::from(crate::model::MIN_SCORE)..=f64::from(crate::model::MAX_SCORE)).contains(&r) {
            Some(r as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let raw = "Sure! Here you go:\n```json\n{\"a\": [1, 2]}\n```\nAnything else?";
        let out: ParseOutcome<HashMap<String, Vec<u8>>> = parse_object(raw);
        assert_eq!(out.ok().unwrap()["a"], vec![1, 2]);
    }

    #[test]
    fn retries_with_normalized_quotes() {
        let raw = "[“one”, “two”]";
        let out: ParseOutcome<Vec<String>> = parse_array(raw);
        assert_eq!(out.ok().unwrap(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn failure_is_tagged_with_reason() {
        match parse_object::<HashMap<String, String>>("no json here") {
            ParseOutcome::ParseFailed { raw, reason } => {
                assert_eq!(raw, "no json here");
                assert!(reason.contains("span"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(parse_array::<Vec<u8>>("[1, 2").ok().is_none());
    }

    #[test]
    fn text_responses_are_trimmed_and_must_be_non_empty() {
        assert_eq!(parse_text("  - one\n- two \n").ok().unwrap(), "- one\n- two");
        match parse_text(" \n ") {
            ParseOutcome::ParseFailed { reason, .. } => assert_eq!(reason, "empty response"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn lenient_array_skips_bad_entries() {
        #[derive(Deserialize)]
        struct E {
            id: WireId,
        }
        let out: ParseOutcome<Vec<E>> = parse_array_lenient(r#"[{"id": "a"}, {"x": 1}, {"id": 7}]"#);
        let ids: Vec<String> = out.ok().unwrap().into_iter().map(|e| e.id.into_key()).collect();
        assert_eq!(ids, vec!["a".to_string(), "7".to_string()]);
    }

    #[test]
    fn wire_scores_round_and_validate() {
        assert_eq!(WireScore::Int(7).to_score(), Some(7));
        assert_eq!(WireScore::Float(7.6).to_score(), Some(8));
        assert_eq!(WireScore::Text(" 9 ".into()).to_score(), Some(9));
        assert_eq!(WireScore::Int(0).to_score(), None);
        assert_eq!(WireScore::Int(11).to_score(), None);
        assert_eq!(WireScore::Text("high".into()).to_score(), None);
    }
}

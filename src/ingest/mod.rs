// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::collections::{BTreeSet, HashSet};

use futures::stream::{self, StreamExt};
use metrics::counter;
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

use crate::config::CurationPolicy;
use crate::ingest::types::{RawRecord, SourceProvider};
use crate::model::{
    Category, DropLedger, DropReason, ItemId, NewsItem, ScoreBand, DEFAULT_SCORE,
};

pub use providers::JsonFileProvider;

const TITLE_MAX_CHARS: usize = 500;
const SUMMARY_MAX_CHARS: usize = 1500;
/// Shorter normalized titles only match on an identical word set.
const NEAR_DUP_MIN_CHARS: usize = 24;

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    crate::text::truncate_chars(&out, max_chars)
}

/// Canonical form of a link: no fragment, no `utm_*` parameters.
/// Unparseable links fall back to the trimmed input.
pub fn canonical_url(link: &str) -> String {
    let trimmed = link.trim();
    let Ok(mut url) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    url.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// First 16 hex chars of SHA-256 over the canonical URL.
pub fn item_id(canonical: &str) -> ItemId {
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Lowercased alphanumeric words, used for near-duplicate comparison.
fn title_key(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Near-exact title match on `title_key` output.
///
/// Same word set always matches. Otherwise both titles must carry the same
/// numeric tokens, be long enough and reach `threshold` similarity, so
/// "Rust 1.82 released" and "Rust 1.83 released" stay distinct.
pub fn is_near_duplicate(a: &str, b: &str, threshold: f64) -> bool {
    if threshold >= 1.0 || a.is_empty() || b.is_empty() {
        return false;
    }
    fn words(s: &str) -> BTreeSet<&str> {
        s.split_whitespace().collect()
    }
    if words(a) == words(b) {
        return true;
    }
    fn numbers(s: &str) -> Vec<&str> {
        s.split_whitespace()
            .filter(|w| w.chars().any(|c| c.is_ascii_digit()))
            .collect()
    }
    if numbers(a) != numbers(b) {
        return false;
    }
    if a.chars().count().min(b.chars().count()) < NEAR_DUP_MIN_CHARS {
        return false;
    }
    strsim::normalized_levenshtein(a, b) >= threshold
}

/// Canonicalize records and remove repeats, rollups and low-value noise.
///
/// Kept items retain their relative input order; `ingest_order` is their
/// position in the returned vector.
pub fn ingest(
    records: Vec<RawRecord>,
    delivered: &HashSet<ItemId>,
    policy: &CurationPolicy,
    near_duplicate_threshold: f64,
) -> (Vec<NewsItem>, DropLedger) {
    crate::metrics::ensure_described();

    let received = records.len();
    let mut drops = DropLedger::default();
    let mut seen_ids: HashSet<ItemId> = HashSet::new();
    let mut rollup_sources: HashSet<String> = HashSet::new();
    let mut kept_keys: Vec<String> = Vec::new();
    let mut kept: Vec<NewsItem> = Vec::with_capacity(received);

    for rec in records {
        let link = canonical_url(&rec.link);
        if link.is_empty() {
            drops.record(DropReason::MissingLink);
            continue;
        }

        let id = item_id(&link);
        if delivered.contains(&id) {
            drops.record(DropReason::AlreadyDelivered);
            continue;
        }
        if !seen_ids.insert(id.clone()) {
            drops.record(DropReason::DuplicateId);
            continue;
        }

        let title = normalize_text(&rec.title, TITLE_MAX_CHARS);
        let summary = normalize_text(&rec.summary, SUMMARY_MAX_CHARS);
        let source = rec.source.trim().to_string();

        // One rollup per source: the first one that survives every filter.
        let rollup_key = policy.is_rollup(&title).then(|| source.to_lowercase());
        if rollup_key.as_ref().is_some_and(|k| rollup_sources.contains(k)) {
            drops.record(DropReason::Rollup);
            continue;
        }

        if policy.is_low_value(&title, &summary) {
            drops.record(DropReason::LowValue);
            continue;
        }

        let key = title_key(&title);
        if kept_keys
            .iter()
            .any(|k| is_near_duplicate(k, &key, near_duplicate_threshold))
        {
            drops.record(DropReason::NearDuplicate);
            continue;
        }

        if let Some(k) = rollup_key {
            rollup_sources.insert(k);
        }
        kept_keys.push(key);
        kept.push(NewsItem {
            id,
            title,
            summary,
            link,
            source,
            published: rec.published.trim().to_string(),
            category: Category::DEFAULT,
            score: DEFAULT_SCORE,
            band: ScoreBand::from_score(DEFAULT_SCORE),
            score_reason: String::new(),
            label: None,
            title_translated: None,
            summary_translated: None,
            one_liner: None,
            ingest_order: kept.len(),
        });
    }

    tracing::info!(
        target: "ingest",
        received,
        kept = kept.len(),
        dropped = drops.total(),
        already_delivered = drops.count(DropReason::AlreadyDelivered),
        duplicate_id = drops.count(DropReason::DuplicateId),
        rollup = drops.count(DropReason::Rollup),
        low_value = drops.count(DropReason::LowValue),
        near_duplicate = drops.count(DropReason::NearDuplicate),
        "ingestion finished"
    );

    (kept, drops)
}

/// Fetch every provider with at most `limit` in flight. A failing provider is
/// logged, counted and skipped. Output keeps provider order.
pub async fn fetch_all(providers: &[Box<dyn SourceProvider>], limit: usize) -> Vec<RawRecord> {
    crate::metrics::ensure_described();

    let results: Vec<_> = stream::iter(providers.iter())
        .map(|p| async move { (p.name().to_string(), p.fetch_latest().await) })
        .buffered(limit.max(1))
        .collect()
        .await;

    let mut raw = Vec::new();
    for (name, res) in results {
        match res {
            Ok(mut v) => {
                tracing::debug!(target: "ingest", provider = %name, records = v.len(), "provider fetched");
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, provider = %name, "provider error");
                counter!("ingest_provider_errors_total").increment(1);
            }
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_decodes_strips_and_collapses() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b>!</p>  ";
        assert_eq!(normalize_text(s, 100), "Hello, world!");
        assert_eq!(normalize_text("abcdef", 3), "abc");
    }

    #[test]
    fn canonical_url_drops_fragment_and_tracking() {
        assert_eq!(
            canonical_url(" https://a.example/post?utm_source=x&id=3#comments "),
            "https://a.example/post?id=3"
        );
        assert_eq!(
            canonical_url("https://a.example/post?utm_medium=rss"),
            "https://a.example/post"
        );
        assert_eq!(canonical_url("not a url"), "not a url");
    }

    #[test]
    fn item_id_is_16_hex_chars_and_stable() {
        let a = item_id("https://a.example/post");
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, item_id("https://a.example/post"));
        assert_ne!(a, item_id("https://a.example/other"));
    }

    #[test]
    fn near_duplicate_is_near_exact() {
        let t = 0.98;
        let k = |s: &str| title_key(s);
        assert!(is_near_duplicate(&k("Tokio 2.0: released!"), &k("Released Tokio 2.0"), t));
        assert!(!is_near_duplicate(&k("Rust 1.82 released"), &k("Rust 1.83 released"), t));
        assert!(!is_near_duplicate(&k("GPT-5 released"), &k("GPT-4 released"), t));
        // long titles with a single typo
        assert!(is_near_duplicate(
            &k("Postgres adds native vector search to the core distribution"),
            &k("Postgres adds native vector search to the core distributon"),
            t
        ));
        assert!(!is_near_duplicate(&k("Same words here"), &k("Same words here"), 1.0));
    }

    #[test]
    fn title_key_ignores_case_and_punctuation() {
        assert_eq!(title_key("Rust 2.0: Released!"), "rust 2 0 released");
    }
}

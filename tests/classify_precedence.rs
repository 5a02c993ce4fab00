// tests/classify_precedence.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use news_curator::config::CurationPolicy;
use news_curator::generation::scripted::payload_ids;
use news_curator::ingest::ingest;
use news_curator::model::{Category, Phase, PipelineState};
use news_curator::stages::{CallContext, Classifier, Stage};
use news_curator::{CallSite, GenerationError, RawRecord, ScriptedGenerator};
use parking_lot::Mutex;
use serde_json::json;

fn rec(title: &str, link: &str, source: &str) -> RawRecord {
    RawRecord {
        title: title.into(),
        link: link.into(),
        summary: "Long enough summary text for this test item.".into(),
        published: String::new(),
        source: source.into(),
    }
}

fn ctx(gen: &ScriptedGenerator) -> CallContext {
    CallContext {
        generator: Arc::new(gen.clone()),
        timeout: Duration::from_secs(5),
        max_concurrency: 4,
        payload_summary_chars: 200,
        target_language: "Simplified Chinese".into(),
    }
}

fn state(records: Vec<RawRecord>, policy: &CurationPolicy) -> PipelineState {
    let (items, drops) = ingest(records, &HashSet::new(), policy, 1.0);
    let mut st = PipelineState::new(items, drops);
    st.advance(Phase::Filtered);
    st
}

fn ten_records() -> Vec<RawRecord> {
    vec![
        // forced by source, even though titles hit Agent/TechDepth keywords
        rec("Bedrock Agents now support MCP", "https://aws.example/1", "AWS News Blog"),
        rec("Vector search in OpenSearch", "https://aws.example/2", "AWS News Blog"),
        rec("Quarterly customer stories", "https://aws.example/3", "aws news blog"),
        // keyword tier
        rec("Agentic workflows in practice", "https://dev.example/1", "Dev.to"),
        rec("A guide to multi-agent orchestration", "https://dev.example/2", "Hacker News"),
        // left for the model
        rec("Quantum chip startup opens new lab", "https://n.example/1", "Hacker News"),
        rec("Survey of developer salaries in Europe", "https://n.example/2", "Hacker News"),
        rec("City council approves new transit budget", "https://n.example/3", "Hacker News"),
        rec("Open source database hits version two", "https://n.example/4", "Hacker News"),
        rec("Compiler team shares performance numbers", "https://n.example/5", "Hacker News"),
    ]
}

#[tokio::test]
async fn forced_then_keyword_then_model() {
    let policy = CurationPolicy::default();
    let st = state(ten_records(), &policy);
    let forced_ids: Vec<String> = st.items[..3].iter().map(|it| it.id.clone()).collect();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in = seen.clone();
    let forced_in = forced_ids.clone();
    let gen = ScriptedGenerator::new().on_fn(CallSite::Classify, move |req| {
        let ids = payload_ids(&req.user);
        seen_in.lock().extend(ids.iter().cloned());
        // The model also tries to re-file the forced items; it must not win.
        Ok(json!({
            "TechDepth": ids,
            "Industry": forced_in,
            "Gossip": ["whatever"],
        })
        .to_string())
    });

    let classifier = Classifier::new(ctx(&gen), Arc::new(policy)).unwrap();
    let out = classifier.run(st).await;

    let cats: Vec<Category> = out.items.iter().map(|it| it.category).collect();
    assert_eq!(
        cats,
        vec![
            Category::Aws,
            Category::Aws,
            Category::Aws,
            Category::Agent,
            Category::Agent,
            Category::TechDepth,
            Category::TechDepth,
            Category::TechDepth,
            Category::TechDepth,
            Category::TechDepth,
        ]
    );

    // Only the five unresolved items were sent to the model.
    let sent = seen.lock().clone();
    assert_eq!(sent.len(), 5);
    assert!(forced_ids.iter().all(|id| !sent.contains(id)));
    assert_eq!(gen.call_count(CallSite::Classify), 1);

    assert_eq!(out.phase, Phase::Classified);
    assert_eq!(out.category_index[&Category::Aws].len(), 3);
    assert_eq!(out.category_index[&Category::Agent].len(), 2);
    assert_eq!(out.category_index[&Category::TechDepth].len(), 5);
    assert!(!out.category_index.contains_key(&Category::Industry));
}

#[tokio::test]
async fn no_call_when_rules_resolve_everything() {
    let policy = CurationPolicy::default();
    let st = state(ten_records()[..5].to_vec(), &policy);
    let gen = ScriptedGenerator::new();
    let out = Classifier::new(ctx(&gen), Arc::new(policy))
        .unwrap()
        .run(st)
        .await;
    assert_eq!(gen.call_count(CallSite::Classify), 0);
    assert_eq!(out.items.len(), 5);
}

#[tokio::test]
async fn failed_call_falls_back_to_default_category() {
    let policy = CurationPolicy::default();
    let st = state(ten_records(), &policy);
    let gen = ScriptedGenerator::new().fail(
        CallSite::Classify,
        GenerationError::Transport {
            call: CallSite::Classify,
            reason: "connection reset".into(),
        },
    );
    let out = Classifier::new(ctx(&gen), Arc::new(policy))
        .unwrap()
        .run(st)
        .await;
    assert!(out.items[5..].iter().all(|it| it.category == Category::Industry));
    assert_eq!(out.items[0].category, Category::Aws);
    assert_eq!(out.items[3].category, Category::Agent);
}

#[tokio::test]
async fn ids_listed_twice_take_the_higher_priority_category() {
    let policy = CurationPolicy::default();
    let st = state(ten_records()[5..7].to_vec(), &policy);
    let a = st.items[0].id.clone();
    let b = st.items[1].id.clone();
    let gen = ScriptedGenerator::new().on(
        CallSite::Classify,
        format!(
            "Result:\n{}",
            json!({ "Industry": [a, b], "AWS": [a] })
        ),
    );
    let out = Classifier::new(ctx(&gen), Arc::new(policy))
        .unwrap()
        .run(st)
        .await;
    assert_eq!(out.items[0].category, Category::Aws);
    assert_eq!(out.items[1].category, Category::Industry);
}

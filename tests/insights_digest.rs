// tests/insights_digest.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use news_curator::config::{CurationPolicy, PipelineConfig};
use news_curator::ingest::ingest;
use news_curator::model::{Phase, PipelineState};
use news_curator::stages::{CallContext, Insights, Stage};
use news_curator::{CallSite, GenerationError, RawRecord, ScriptedGenerator};
use parking_lot::Mutex;
use serde_json::{json, Value};

fn ctx(gen: &ScriptedGenerator) -> CallContext {
    CallContext {
        generator: Arc::new(gen.clone()),
        timeout: Duration::from_secs(5),
        max_concurrency: 4,
        payload_summary_chars: 200,
        target_language: "English".into(),
    }
}

fn enriched_state() -> PipelineState {
    let titles = [
        "Inference runtime ships new scheduler",
        "Open source database hits version two",
        "Quantum chip startup opens new lab",
    ];
    let records = titles
        .iter()
        .enumerate()
        .map(|(i, t)| RawRecord {
            title: t.to_string(),
            link: format!("https://i.example/{i}"),
            summary: "Some summary".into(),
            published: String::new(),
            source: "Hacker News".into(),
        })
        .collect();
    let (items, drops) = ingest(records, &HashSet::new(), &CurationPolicy::default(), 1.0);
    let mut st = PipelineState::new(items, drops);
    st.advance(Phase::Enriched);
    st
}

fn action(title: &str) -> Value {
    json!({ "type": "Evaluate", "title": title, "reason": "Trend", "action": "Try it", "priority": "HIGH" })
}

#[tokio::test]
async fn summary_commentary_and_action_items_are_cleaned() {
    let commentary_input: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let seen = commentary_input.clone();
    let actions = json!([
        action("Benchmark the new scheduler"),
        { "type": "Watch", "reason": "No title" },
        action("Track database release"),
        action("Review quantum roadmap"),
        action("Update internal docs"),
        action("One too many"),
    ]);
    let gen = ScriptedGenerator::new()
        .on(CallSite::Trends, r#"["Cheaper inference"]"#)
        .on(CallSite::Clusters, "[]")
        .on(
            CallSite::Summary,
            "- Schedulers get smarter\n\n* Databases   mature\n• Quantum labs expand\n",
        )
        .on(CallSite::ActionItems, format!("Sure:\n{actions}"))
        .on_fn(CallSite::Commentary, move |req| {
            *seen.lock() = Some(serde_json::from_str(&req.user).unwrap());
            Ok("  A quiet day,\n but the runtime work matters.  ".into())
        });

    let out = Insights::new(ctx(&gen), &PipelineConfig::default())
        .run(enriched_state())
        .await;

    assert_eq!(
        out.summary,
        "- Schedulers get smarter\n- Databases mature\n- Quantum labs expand"
    );
    assert_eq!(out.commentary, "A quiet day, but the runtime work matters.");

    let titles: Vec<&str> = out.action_items.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Benchmark the new scheduler",
            "Track database release",
            "Review quantum roadmap",
            "Update internal docs",
        ]
    );
    assert_eq!(out.action_items[0].kind, "Evaluate");
    assert_eq!(out.action_items[0].priority, "high");

    // commentary builds on the cleaned summary and the trends
    let sent = commentary_input.lock().clone().unwrap();
    assert_eq!(sent["summary"], json!(out.summary));
    assert_eq!(sent["trends"], json!(["Cheaper inference"]));

    let calls = gen.calls();
    let pos = |c: CallSite| calls.iter().position(|x| *x == c).unwrap();
    assert!(pos(CallSite::Trends) < pos(CallSite::Summary));
    assert!(pos(CallSite::Summary) < pos(CallSite::Commentary));
    assert!(pos(CallSite::Summary) < pos(CallSite::ActionItems));
}

#[tokio::test]
async fn failed_calls_leave_empty_artifacts_and_keep_trends() {
    let gen = ScriptedGenerator::new()
        .on(CallSite::Trends, r#"["Agents everywhere"]"#)
        .on(CallSite::Summary, "   \n  ")
        .on(CallSite::ActionItems, "no json at all")
        .fail(
            CallSite::Commentary,
            GenerationError::Timeout {
                call: CallSite::Commentary,
                after: Duration::from_secs(60),
            },
        );

    let st = enriched_state();
    let before = st.items.clone();
    let out = Insights::new(ctx(&gen), &PipelineConfig::default()).run(st).await;

    assert_eq!(out.trends, vec!["Agents everywhere".to_string()]);
    assert_eq!(out.summary, "");
    assert_eq!(out.commentary, "");
    assert!(out.action_items.is_empty());
    assert_eq!(out.items, before);
}

#[tokio::test]
async fn disabled_insights_make_no_calls() {
    let gen = ScriptedGenerator::new()
        .on(CallSite::Summary, "- never")
        .on(CallSite::Commentary, "never");
    let cfg = PipelineConfig {
        insights: false,
        ..PipelineConfig::default()
    };
    let out = Insights::new(ctx(&gen), &cfg).run(enriched_state()).await;

    assert!(gen.calls().is_empty());
    assert_eq!(out.summary, "");
    assert_eq!(out.commentary, "");
    assert!(out.action_items.is_empty());
}

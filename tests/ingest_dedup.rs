// tests/ingest_dedup.rs
use std::collections::HashSet;

use news_curator::config::{CurationPolicy, PipelineConfig};
use news_curator::ingest::{canonical_url, ingest, item_id};
use news_curator::model::DropReason;
use news_curator::RawRecord;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn default_threshold() -> f64 {
    PipelineConfig::default().near_duplicate_threshold
}

fn rec(title: &str, link: &str, source: &str) -> RawRecord {
    RawRecord {
        title: title.into(),
        link: link.into(),
        summary: format!("Details about {title}"),
        published: "2026-10-16T08:00:00Z".into(),
        source: source.into(),
    }
}

#[test]
fn same_canonical_url_is_kept_once() {
    let raw = vec![
        rec("Tokio 2.0 released", "https://blog.example/tokio-2", "Rust Blog"),
        rec("Tokio two point oh", "https://blog.example/tokio-2?utm_source=hn#top", "Hacker News"),
        rec("Tokio release notes", " https://blog.example/tokio-2 ", "Dev.to"),
    ];
    let (kept, drops) = ingest(raw, &HashSet::new(), &CurationPolicy::default(), default_threshold());
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].source, "Rust Blog"); // first wins
    assert_eq!(kept[0].id, item_id("https://blog.example/tokio-2"));
    assert_eq!(drops.count(DropReason::DuplicateId), 2);
}

#[test]
fn three_weekly_digests_from_one_source_collapse_to_one() {
    let raw = vec![
        rec("Compiler internals explained", "https://x.example/a", "Other"),
        rec("X Weekly Digest #1", "https://x.example/d1", "X"),
        rec("X Weekly Digest #2", "https://x.example/d2", "X"),
        rec("Y weekly digest", "https://y.example/d", "Y"),
        rec("X Weekly Digest #3", "https://x.example/d3", "X"),
    ];
    let (kept, drops) = ingest(raw, &HashSet::new(), &CurationPolicy::default(), default_threshold());

    let titles: Vec<&str> = kept.iter().map(|it| it.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Compiler internals explained", "X Weekly Digest #1", "Y weekly digest"]
    );
    assert_eq!(drops.count(DropReason::Rollup), 2);
    // rollup keeps its original position
    assert_eq!(kept[1].ingest_order, 1);
}

#[test]
fn delivered_and_low_value_items_are_dropped() {
    let delivered: HashSet<String> = [item_id("https://old.example/post")].into_iter().collect();
    let raw = vec![
        rec("Seen yesterday", "https://old.example/post", "Hacker News"),
        rec("RT @bob: what a launch", "https://social.example/1", "Social"),
        rec("Quoting someone about databases", "https://social.example/2", "Social"),
        RawRecord {
            title: "tokio-rs/tokio".into(),
            link: "https://github.com/tokio-rs/tokio".into(),
            summary: "tokio-rs/tokio".into(),
            published: String::new(),
            source: "GitHub Trending".into(),
        },
        rec("A fresh article", "https://new.example/post", "Hacker News"),
        rec("No link here", "   ", "Hacker News"),
    ];
    let (kept, drops) = ingest(raw, &delivered, &CurationPolicy::default(), default_threshold());

    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].title, "A fresh article");
    assert_eq!(drops.count(DropReason::AlreadyDelivered), 1);
    assert_eq!(drops.count(DropReason::LowValue), 3);
    assert_eq!(drops.count(DropReason::MissingLink), 1);
}

#[test]
fn near_duplicate_titles_are_dropped_unless_disabled() {
    let raw = || {
        vec![
            rec("OpenAI releases new reasoning model", "https://a.example/1", "A"),
            rec("OpenAI releases new reasoning model!", "https://b.example/1", "B"),
            rec("Completely different headline", "https://c.example/1", "C"),
        ]
    };
    let (kept, drops) = ingest(raw(), &HashSet::new(), &CurationPolicy::default(), default_threshold());
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].source, "A");
    assert_eq!(drops.count(DropReason::NearDuplicate), 1);

    let (kept, _) = ingest(raw(), &HashSet::new(), &CurationPolicy::default(), 1.0);
    assert_eq!(kept.len(), 3);
}

#[test]
fn distinct_releases_with_similar_titles_all_survive() {
    let raw = vec![
        rec("Rust 1.82 released", "https://r.example/182", "Rust Blog"),
        rec("Rust 1.83 released", "https://r.example/183", "Rust Blog"),
        rec("GPT-5 released", "https://g.example/5", "Hacker News"),
        rec("GPT-4 released", "https://g.example/4", "Hacker News"),
    ];
    let (kept, drops) = ingest(raw, &HashSet::new(), &CurationPolicy::default(), default_threshold());
    let titles: Vec<&str> = kept.iter().map(|it| it.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Rust 1.82 released", "Rust 1.83 released", "GPT-5 released", "GPT-4 released"]
    );
    assert_eq!(drops.count(DropReason::NearDuplicate), 0);
}

#[test]
fn html_in_records_is_normalized() {
    let raw = vec![RawRecord {
        title: "  Rust &amp; <b>WebAssembly</b>   news ".into(),
        link: "https://a.example/wasm".into(),
        summary: "<p>First&nbsp;line</p>\n\n<p>second</p>".into(),
        published: String::new(),
        source: " Rust Blog ".into(),
    }];
    let (kept, _) = ingest(raw, &HashSet::new(), &CurationPolicy::default(), default_threshold());
    assert_eq!(kept[0].title, "Rust & WebAssembly news");
    assert_eq!(kept[0].summary, "First line second");
    assert_eq!(kept[0].source, "Rust Blog");
}

#[test]
fn randomized_links_never_produce_duplicate_ids() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut raw = Vec::new();
    let mut distinct = HashSet::new();
    for i in 0..300 {
        let n: u32 = rng.random_range(0..40);
        distinct.insert(n);
        let mut link = format!("https://site{}.example/post/{n}", n % 5);
        if rng.random_bool(0.5) {
            link.push_str("?utm_source=feed&utm_campaign=x");
        }
        if rng.random_bool(0.3) {
            link.push_str("#comments");
        }
        raw.push(rec(&format!("Headline {i}"), &link, "Feed"));
    }

    let (kept, drops) = ingest(raw, &HashSet::new(), &CurationPolicy::default(), 1.0);

    let ids: HashSet<&str> = kept.iter().map(|it| it.id.as_str()).collect();
    assert_eq!(ids.len(), kept.len());
    assert_eq!(kept.len(), distinct.len());
    assert_eq!(drops.count(DropReason::DuplicateId), 300 - distinct.len());
    for it in &kept {
        assert_eq!(it.id, item_id(&canonical_url(&it.link)));
    }
}

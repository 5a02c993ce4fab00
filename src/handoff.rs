// src/handoff.rs
//! The digest handed to a renderer, and the delivered-set store that is
//! written only after rendering succeeded.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::model::{
    ActionItem, Category, Cluster, DropLedger, ItemId, NewsItem, PipelineState, PipelineWarning,
};

/// Item ids of one category, in ranked order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySection {
    pub category: Category,
    pub description: &'static str,
    pub item_ids: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub total: usize,
    pub category_counts: BTreeMap<Category, usize>,
    pub avg_score: f64,
    pub drops: DropLedger,
    pub warnings: Vec<PipelineWarning>,
    pub generated_at: DateTime<Utc>,
}

/// Everything a renderer needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuratedDigest {
    /// Ranked.
    pub items: Vec<NewsItem>,
    /// Fixed category priority order; empty categories omitted.
    pub sections: Vec<CategorySection>,
    pub headline: Vec<ItemId>,
    pub trends: Vec<String>,
    pub clusters: Vec<Cluster>,
    /// `- ` bullet lines joined by newlines; empty when unavailable.
    pub summary: String,
    pub commentary: String,
    pub action_items: Vec<ActionItem>,
    pub metadata: RunMetadata,
}

impl CuratedDigest {
    pub fn from_state(state: PipelineState, generated_at: DateTime<Utc>) -> Self {
        let sections: Vec<CategorySection> = state
            .category_index
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(category, item_ids)| CategorySection {
                category,
                description: category.description(),
                item_ids,
            })
            .collect();
        let category_counts = sections
            .iter()
            .map(|s| (s.category, s.item_ids.len()))
            .collect();

        let total = state.items.len();
        let avg_score = if total == 0 {
            0.0
        } else {
            let sum: u32 = state.items.iter().map(|it| u32::from(it.score)).sum();
            (f64::from(sum) / total as f64 * 10.0).round() / 10.0
        };

        Self {
            items: state.items,
            sections,
            headline: state.headline,
            trends: state.trends,
            clusters: state.clusters,
            summary: state.summary,
            commentary: state.commentary,
            action_items: state.action_items,
            metadata: RunMetadata {
                total,
                category_counts,
                avg_score,
                drops: state.drops,
                warnings: state.warnings,
                generated_at,
            },
        }
    }
}

/// Consumes a digest (HTML, email, JSON...).
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, digest: &CuratedDigest) -> Result<()>;
}

/// Append-only record of ids already surfaced.
#[async_trait::async_trait]
pub trait DeliveredStore: Send + Sync {
    async fn load(&self) -> Result<HashSet<ItemId>>;
    /// Add `(id, title)` pairs. Existing entries are never rewritten.
    async fn append(&self, entries: &[(ItemId, String)]) -> Result<()>;
}

/// Write via `<path>.tmp` + rename so readers never see a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Pretty JSON dump of the digest.
pub struct JsonFileRenderer {
    path: PathBuf,
}

impl JsonFileRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Renderer for JsonFileRenderer {
    async fn render(&self, digest: &CuratedDigest) -> Result<()> {
        let body = serde_json::to_vec_pretty(digest).context("serializing digest")?;
        write_atomic(&self.path, &body).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveredEntry {
    pub title: String,
    pub sent_at: DateTime<Utc>,
}

/// `{id: {title, sent_at}}` in a JSON file.
pub struct JsonFileDeliveredStore {
    path: PathBuf,
}

impl JsonFileDeliveredStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_map(&self) -> Result<BTreeMap<ItemId, DeliveredEntry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) if s.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing delivered set {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => {
                Err(e).with_context(|| format!("reading delivered set {}", self.path.display()))
            }
        }
    }
}

#[async_trait::async_trait]
impl DeliveredStore for JsonFileDeliveredStore {
    async fn load(&self) -> Result<HashSet<ItemId>> {
        Ok(self.read_map().await?.into_keys().collect())
    }

    async fn append(&self, entries: &[(ItemId, String)]) -> Result<()> {
        let mut map = self.read_map().await?;
        let now = Utc::now();
        for (id, title) in entries {
            map.entry(id.clone()).or_insert_with(|| DeliveredEntry {
                title: title.clone(),
                sent_at: now,
            });
        }
        let body = serde_json::to_vec_pretty(&map).context("serializing delivered set")?;
        write_atomic(&self.path, &body).await
    }
}

/// Render, then persist the delivered ids. Nothing is persisted when the
/// renderer fails. Returns the number of ids handed to the store.
pub async fn deliver(
    digest: &CuratedDigest,
    renderer: &dyn Renderer,
    store: &dyn DeliveredStore,
) -> Result<usize, DeliveryError> {
    renderer.render(digest).await.map_err(|e| {
        tracing::error!(target: "handoff", error = %format!("{e:#}"), "render failed; delivered set untouched");
        DeliveryError::Render(e)
    })?;

    let entries: Vec<(ItemId, String)> = digest
        .items
        .iter()
        .map(|it| (it.id.clone(), it.title.clone()))
        .collect();
    store
        .append(&entries)
        .await
        .map_err(DeliveryError::Persist)?;

    tracing::info!(target: "handoff", delivered = entries.len(), "digest delivered");
    Ok(entries.len())
}

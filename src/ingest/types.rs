// src/ingest/types.rs
use anyhow::Result;

/// One record as delivered by a source, before canonicalization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawRecord {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub summary: String,
    /// Opaque publish timestamp as the source gave it.
    #[serde(default)]
    pub published: String,
    pub source: String, // e.g., "Hacker News", "AWS News Blog"
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>>;
    fn name(&self) -> &str;
}

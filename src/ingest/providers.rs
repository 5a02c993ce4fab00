// src/ingest/providers.rs
use anyhow::{Context, Result};
use std::path::PathBuf;

use super::types::{RawRecord, SourceProvider};

/// Reads a JSON array of records from a file.
pub struct JsonFileProvider {
    name: String,
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("json")
            .to_string();
        Self { name, path }
    }
}

#[async_trait::async_trait]
impl SourceProvider for JsonFileProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading records from {}", self.path.display()))?;
        let records: Vec<RawRecord> = serde_json::from_str(&data)
            .with_context(|| format!("parsing records in {}", self.path.display()))?;
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// src/metrics.rs
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "curation_dropped_total",
            "Items removed during ingestion or relevance filtering, by reason."
        );
        describe_counter!(
            "curation_items_total",
            "Items present when the pipeline entered each phase."
        );
        describe_counter!("generation_calls_total", "Text-generation calls, by call site.");
        describe_counter!(
            "generation_failures_total",
            "Text-generation calls that timed out, failed or were disabled."
        );
        describe_counter!(
            "generation_parse_failures_total",
            "Responses that could not be parsed into the expected schema."
        );
        describe_counter!(
            "curation_degenerate_output_total",
            "Runs where every returned score had the same value."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Source provider fetch/parse errors."
        );
        describe_gauge!("curation_last_run_ts", "Unix ts when the pipeline last finished.");
    });
}

/// Record the completion time of a run.
pub fn mark_run_finished() {
    ensure_described();
    gauge!("curation_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text to `path` (tmp + rename).
    pub fn write_textfile(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = path.with_extension("prom.tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(self.render().as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(tmp, path)
    }
}

//! Markdown QA reporting.
//!
//! Compares the raw upload with the committed cleaned table and writes a
//! Markdown report artifact. The shape metrics are computed locally by
//! re-reading both tables; the narrative assessment comes from the
//! generation service, and a service failure is surfaced to the caller.

use crate::error::{CleaningError, Result};
use crate::llm::ChatProvider;
use crate::orchestrator::{shape_metrics, CleaningMetrics};
use crate::profiler::profile_table;
use crate::reader::read_table;
use crate::store::{ArtifactKind, ArtifactStore, DatasetId};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// System instruction for the QA narrative.
const REPORT_PROMPT: &str = "\
You are a data quality analyst.
You will receive before/after summaries of a dataset cleaning run as JSON.
Write a concise Markdown QA report covering: what changed in shape, how null
counts moved per column, which issues appear resolved, and anything that
still looks suspicious. Use Markdown headings and bullet lists only.";

/// How many sample values per column to include in the report context.
const REPORT_SAMPLE_VALUES: usize = 5;

/// A stored QA report.
#[derive(Debug, Clone)]
pub struct QaReport {
    pub text: String,
    pub path: PathBuf,
}

/// Builds and stores QA reports for committed cleaning runs.
pub struct QaReporter {
    store: Arc<dyn ArtifactStore>,
    provider: Arc<dyn ChatProvider>,
}

impl QaReporter {
    pub fn new(store: Arc<dyn ArtifactStore>, provider: Arc<dyn ChatProvider>) -> Self {
        Self { store, provider }
    }

    /// Generate the QA report for a dataset, store it as the report
    /// artifact, and return both the text and its path.
    ///
    /// Requires both the raw upload and the cleaned table; a missing
    /// artifact fails with [`CleaningError::MissingArtifact`].
    pub fn generate(&self, id: DatasetId) -> Result<QaReport> {
        let raw_path = self
            .store
            .get(id, ArtifactKind::RawUpload)
            .ok_or_else(|| CleaningError::MissingArtifact(format!("raw upload for {id}")))?;
        let cleaned_path = self
            .store
            .get(id, ArtifactKind::CleanedTable)
            .ok_or_else(|| CleaningError::MissingArtifact(format!("cleaned table for {id}")))?;

        let before = read_table(&raw_path)?;
        let after = read_table(&cleaned_path)?;
        let metrics = shape_metrics(&before, &after);

        let payload = serde_json::json!({
            "metrics": metrics,
            "before": profile_table(&before, REPORT_SAMPLE_VALUES)?.to_payload(),
            "after": profile_table(&after, REPORT_SAMPLE_VALUES)?.to_payload(),
        })
        .to_string();

        let narrative = self.provider.complete(REPORT_PROMPT, &payload, false)?;

        let text = render_report(id, &metrics, &narrative);
        let path = self.store.put(id, ArtifactKind::Report, text.as_bytes())?;
        info!(%id, path = %path.display(), "report stored");
        Ok(QaReport { text, path })
    }
}

fn render_report(id: DatasetId, metrics: &CleaningMetrics, narrative: &str) -> String {
    format!(
        "# Data Cleaning QA Report\n\n\
         - Dataset: `{id}`\n\
         - Generated: {}\n\n\
         ## Shape\n\n\
         | | Before | After | Delta |\n\
         |---|---|---|---|\n\
         | Rows | {} | {} | {:+} |\n\
         | Columns | {} | {} | {:+} |\n\n\
         ## Assessment\n\n\
         {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        metrics.rows_before,
        metrics.rows_after,
        metrics.row_delta(),
        metrics.columns_before,
        metrics.columns_after,
        metrics.column_delta(),
        narrative.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_report_contains_metrics_and_narrative() {
        let id = DatasetId::new();
        let metrics = CleaningMetrics {
            rows_before: 10,
            columns_before: 3,
            rows_after: 9,
            columns_after: 4,
        };

        let report = render_report(id, &metrics, "All clear.");
        assert!(report.contains(&id.to_string()));
        assert!(report.contains("| Rows | 10 | 9 | -1 |"));
        assert!(report.contains("| Columns | 3 | 4 | +1 |"));
        assert!(report.contains("All clear."));
    }

    #[test]
    fn test_render_report_trims_narrative() {
        let id = DatasetId::new();
        let metrics = CleaningMetrics {
            rows_before: 1,
            columns_before: 1,
            rows_after: 1,
            columns_after: 1,
        };

        let report = render_report(id, &metrics, "\n\n  fine  \n");
        assert!(report.ends_with("fine\n"));
    }
}

//! Pipeline orchestration and per-dataset lifecycle.
//!
//! Ties the stages together: upload → analyze → generate → execute → commit,
//! plus the optional master pass and artifact teardown. The orchestrator owns
//! the per-dataset state table; a cleaned table only becomes visible through
//! the store once the whole attempt committed.

use crate::codegen::{
    Analysis, GeneratedProgram, MasterContext, TransformContext, TransformGenerator,
};
use crate::config::{CleaningMode, PipelineConfig};
use crate::error::{CleaningError, Result, ResultExt};
use crate::llm::ChatProvider;
use crate::profiler::{profile_table, TableProfile};
use crate::reader::read_table;
use crate::sandbox::{ExecutionOutcome, ScriptRunner};
use crate::store::{ArtifactKind, ArtifactStore, DatasetId};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// System instruction for direct-record cleaning, where the service returns
/// the cleaned rows instead of a script.
const DIRECT_RECORDS_PROMPT: &str = "\
You are a data-cleaning service.
You will receive a table profile, a list of detected issues, a terminology
mapping, and the raw rows as JSON records.
Apply the suggested fixes and return ONLY a JSON array of cleaned records.
Every record must have the same keys. No markdown, no explanation.";

/// Lifecycle state of one dataset inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningState {
    NoAnalysis,
    Analyzed,
    ScriptGenerated,
    Executing,
    Committed,
    Failed,
}

impl CleaningState {
    /// States in which a cleaning attempt is underway and the artifact tree
    /// must not be torn down.
    fn is_active(self) -> bool {
        matches!(self, Self::ScriptGenerated | Self::Executing)
    }
}

/// Shape comparison between the table before and after a cleaning attempt,
/// always measured by re-reading the stored artifacts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CleaningMetrics {
    pub rows_before: usize,
    pub columns_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,
}

impl CleaningMetrics {
    pub fn row_delta(&self) -> i64 {
        self.rows_after as i64 - self.rows_before as i64
    }

    pub fn column_delta(&self) -> i64 {
        self.columns_after as i64 - self.columns_before as i64
    }
}

/// Outcome of the analysis operation.
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    pub profile: TableProfile,
    pub analysis: Analysis,
}

/// Outcome of a committed cleaning attempt or master pass.
#[derive(Debug, Clone)]
pub struct CleaningResult {
    pub id: DatasetId,
    /// Path of the executed script; `None` in direct-record mode.
    pub script_path: Option<PathBuf>,
    pub cleaned_path: PathBuf,
    pub metrics: CleaningMetrics,
    pub program: Option<GeneratedProgram>,
    /// Captured stdout of the executed script; `None` in direct-record mode.
    pub stdout: Option<String>,
}

/// Drives the cleaning pipeline over an [`ArtifactStore`] and a
/// [`ChatProvider`].
pub struct CleaningOrchestrator {
    store: Arc<dyn ArtifactStore>,
    provider: Arc<dyn ChatProvider>,
    generator: TransformGenerator,
    runner: ScriptRunner,
    config: PipelineConfig,
    states: Mutex<HashMap<DatasetId, CleaningState>>,
    analyses: Mutex<HashMap<DatasetId, Analysis>>,
}

impl CleaningOrchestrator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        provider: Arc<dyn ChatProvider>,
        config: PipelineConfig,
    ) -> Self {
        let runner = ScriptRunner::new(config.interpreter.clone(), config.script_timeout());
        Self {
            store,
            provider: provider.clone(),
            generator: TransformGenerator::new(provider),
            runner,
            config,
            states: Mutex::new(HashMap::new()),
            analyses: Mutex::new(HashMap::new()),
        }
    }

    /// Current lifecycle state of a dataset.
    pub fn state(&self, id: DatasetId) -> CleaningState {
        self.states()
            .get(&id)
            .copied()
            .unwrap_or(CleaningState::NoAnalysis)
    }

    /// Ingest a file, minting a fresh dataset identifier.
    ///
    /// The upload is stored verbatim; parsing happens lazily at analysis
    /// time so a malformed file still gets an identifier and can be deleted.
    pub fn upload(&self, source: &Path) -> Result<DatasetId> {
        let id = DatasetId::new();
        let stored = self.store.put_upload(id, source)?;
        info!(%id, path = %stored.display(), "stored upload");
        Ok(id)
    }

    /// Profile the uploaded table and ask the service for quality issues.
    ///
    /// Service failures degrade to an empty analysis rather than blocking
    /// the pipeline; the degradation is logged, not silent.
    pub fn analyze(&self, id: DatasetId) -> Result<AnalysisSummary> {
        let raw_path = self.require_artifact(id, ArtifactKind::RawUpload)?;
        let df = read_table(&raw_path)?;
        let profile = profile_table(&df, self.config.sample_values)?;

        let analysis = self.generator.analyze(&profile).into_analysis();
        info!(
            %id,
            issues = analysis.issues.len(),
            mapped_columns = analysis.mapping.terminology.len(),
            "analysis complete"
        );

        self.analyses.lock().unwrap_or_else(|e| e.into_inner()).insert(id, analysis.clone());
        self.states().insert(id, CleaningState::Analyzed);
        Ok(AnalysisSummary { profile, analysis })
    }

    /// Run one cleaning attempt end to end and commit the cleaned table.
    ///
    /// At most one attempt runs per dataset at a time; a concurrent call
    /// fails with [`CleaningError::RunInProgress`]. The attempt ends in
    /// `Committed` (cleaned table durably stored and re-readable) or
    /// `Failed` (no cleaned table visible through the store).
    pub fn clean(&self, id: DatasetId) -> Result<CleaningResult> {
        self.begin_execution(id)?;
        let result = self.run_clean(id);
        self.finish_execution(id, &result);
        result
    }

    /// Run the final validation-and-cleanup pass over an already-cleaned
    /// table, producing the final table artifact.
    pub fn master(&self, id: DatasetId) -> Result<CleaningResult> {
        self.begin_execution(id)?;
        let result = self.run_master(id);
        self.finish_execution(id, &result);
        result
    }

    /// Destroy every artifact derived from the upload.
    ///
    /// Refused while a cleaning attempt is executing, so a running script
    /// never writes into a half-deleted directory tree.
    pub fn delete_artifacts(&self, id: DatasetId) -> Result<()> {
        if self.state(id).is_active() {
            return Err(CleaningError::RunInProgress(id.to_string()));
        }
        self.store.delete_all(id)?;
        self.states().remove(&id);
        self.analyses.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        info!(%id, "artifacts deleted");
        Ok(())
    }

    /// Shape comparison between the raw upload and the cleaned table,
    /// re-read from the store rather than trusted from memory.
    pub fn metrics(&self, id: DatasetId) -> Result<CleaningMetrics> {
        let raw = self.require_artifact(id, ArtifactKind::RawUpload)?;
        let cleaned = self.require_artifact(id, ArtifactKind::CleanedTable)?;
        let before = read_table(&raw)?;
        let after = read_table(&cleaned)?;
        Ok(shape_metrics(&before, &after))
    }

    fn run_clean(&self, id: DatasetId) -> Result<CleaningResult> {
        let raw_path = self.require_artifact(id, ArtifactKind::RawUpload)?;
        let before = read_table(&raw_path)?;
        let analysis = self
            .analyses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .unwrap_or_default();

        let out_path = self.store.reserve(id, ArtifactKind::CleanedTable)?;

        let (script_path, program, stdout) = match self.config.cleaning_mode {
            CleaningMode::Script => {
                let ctx = TransformContext {
                    src_path: raw_path.clone(),
                    issues: analysis.issues.clone(),
                    mapping: analysis.mapping.clone(),
                    out_path: out_path.clone(),
                };
                let program = self.generator.generate_transform(&ctx)?.require_valid()?;
                self.states().insert(id, CleaningState::ScriptGenerated);

                let script_path =
                    self.store
                        .put(id, ArtifactKind::GeneratedScript, program.source.as_bytes())?;

                self.states().insert(id, CleaningState::Executing);
                let outcome = self.execute(&script_path)?;
                (Some(script_path), Some(program), Some(outcome.stdout))
            }
            CleaningMode::DirectRecords => {
                self.clean_direct(&before, &analysis, &out_path)?;
                (None, None, None)
            }
        };

        // Commit check: the staged table must exist and read back before it
        // replaces any previously committed table.
        if !out_path.exists() {
            return Err(CleaningError::MissingArtifact(format!(
                "cleaned table for {id} was not produced"
            )));
        }
        let after = read_table(&out_path).context("reading back cleaned table before commit")?;
        let cleaned_path = self.store.commit(id, ArtifactKind::CleanedTable)?;

        let metrics = shape_metrics(&before, &after);
        info!(
            %id,
            rows_before = metrics.rows_before,
            rows_after = metrics.rows_after,
            "cleaning committed"
        );

        Ok(CleaningResult {
            id,
            script_path,
            cleaned_path,
            metrics,
            program,
            stdout,
        })
    }

    fn run_master(&self, id: DatasetId) -> Result<CleaningResult> {
        let raw_path = self.require_artifact(id, ArtifactKind::RawUpload)?;
        let cleaned_path = self.require_artifact(id, ArtifactKind::CleanedTable)?;
        let before = read_table(&cleaned_path)?;

        let out_path = self.store.reserve(id, ArtifactKind::FinalTable)?;
        let ctx = MasterContext {
            raw_path,
            cleaned_path,
            out_path: out_path.clone(),
        };
        let program = self.generator.generate_master(&ctx)?.require_valid()?;
        self.states().insert(id, CleaningState::ScriptGenerated);

        let script_path =
            self.store
                .put(id, ArtifactKind::MasterScript, program.source.as_bytes())?;

        self.states().insert(id, CleaningState::Executing);
        let outcome = self.execute(&script_path)?;

        if !out_path.exists() {
            return Err(CleaningError::MissingArtifact(format!(
                "final table for {id} was not produced"
            )));
        }
        let after = read_table(&out_path).context("reading back final table before commit")?;
        let final_path = self.store.commit(id, ArtifactKind::FinalTable)?;

        let metrics = shape_metrics(&before, &after);
        info!(%id, "master pass committed");

        Ok(CleaningResult {
            id,
            script_path: Some(script_path),
            cleaned_path: final_path,
            metrics,
            program: Some(program),
            stdout: Some(outcome.stdout),
        })
    }

    fn execute(&self, script: &Path) -> Result<ExecutionOutcome> {
        let outcome = self.runner.run(script);
        if !outcome.succeeded() {
            warn!(exit_status = outcome.exit_status, "script failed");
            return Err(CleaningError::ExecutionFailed {
                exit_status: outcome.exit_status,
                stderr: outcome.stderr,
            });
        }
        Ok(outcome)
    }

    /// Direct-record mode: ask the service for cleaned rows and write them
    /// to the reserved output path ourselves.
    fn clean_direct(&self, before: &DataFrame, analysis: &Analysis, out_path: &Path) -> Result<()> {
        let profile = profile_table(before, self.config.sample_values)?;
        let payload = serde_json::json!({
            "profile": profile.to_payload(),
            "issues": analysis.issues,
            "mapping": analysis.mapping,
            "records": dataframe_records(before)?,
        })
        .to_string();

        let response = self.provider.complete(DIRECT_RECORDS_PROMPT, &payload, false)?;
        let records: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(response.trim()).map_err(|e| {
                CleaningError::MalformedResponse(format!("expected JSON record array: {e}"))
            })?;

        let mut df = records_to_dataframe(&records)?;
        let mut file = File::create(out_path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        Ok(())
    }

    fn begin_execution(&self, id: DatasetId) -> Result<()> {
        let mut states = self.states();
        if states.get(&id).is_some_and(|s| s.is_active()) {
            return Err(CleaningError::RunInProgress(id.to_string()));
        }
        states.insert(id, CleaningState::Executing);
        Ok(())
    }

    fn finish_execution(&self, id: DatasetId, result: &Result<CleaningResult>) {
        let state = if result.is_ok() {
            CleaningState::Committed
        } else {
            CleaningState::Failed
        };
        self.states().insert(id, state);
    }

    fn require_artifact(&self, id: DatasetId, kind: ArtifactKind) -> Result<PathBuf> {
        self.store.get(id, kind).ok_or_else(|| {
            CleaningError::MissingArtifact(format!("{} for {id}", kind.display_name()))
        })
    }

    fn states(&self) -> MutexGuard<'_, HashMap<DatasetId, CleaningState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) fn shape_metrics(before: &DataFrame, after: &DataFrame) -> CleaningMetrics {
    CleaningMetrics {
        rows_before: before.height(),
        columns_before: before.width(),
        rows_after: after.height(),
        columns_after: after.width(),
    }
}

/// Render a table as JSON records for the direct-record prompt.
fn dataframe_records(df: &DataFrame) -> Result<Vec<serde_json::Value>> {
    let columns: Vec<(&str, StringChunked)> = df
        .get_columns()
        .iter()
        .map(|c| {
            let series = c.as_materialized_series();
            Ok((series.name().as_str(), series.cast(&DataType::String)?.str()?.clone()))
        })
        .collect::<Result<_>>()?;

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let mut record = serde_json::Map::new();
        for (name, chunked) in &columns {
            let value = chunked
                .get(row)
                .map(|v| serde_json::Value::String(v.to_string()))
                .unwrap_or(serde_json::Value::Null);
            record.insert((*name).to_string(), value);
        }
        records.push(serde_json::Value::Object(record));
    }
    Ok(records)
}

/// Build a string-typed table from service-returned records.
///
/// Column order follows the first record; missing keys become nulls so a
/// ragged response still produces a rectangular table.
fn records_to_dataframe(
    records: &[serde_json::Map<String, serde_json::Value>],
) -> Result<DataFrame> {
    let Some(first) = records.first() else {
        return Err(CleaningError::MalformedResponse(
            "record array was empty".to_string(),
        ));
    };

    let names: Vec<&String> = first.keys().collect();
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let values: Vec<Option<String>> = records
            .iter()
            .map(|record| {
                record.get(name).and_then(|v| match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
            })
            .collect();
        columns.push(Series::new(name.as_str().into(), values).into());
    }
    DataFrame::new(columns).map_err(CleaningError::Polars)
}

//! Integration tests for the dataset cleaning pipeline.
//!
//! These tests drive the orchestrator end to end against a temporary
//! artifact store and a stub generation provider. Generated "scripts" are
//! shell commands executed with `sh`, so no Python installation is needed;
//! the pipeline itself is interpreter-agnostic.

use datamend::{
    ArtifactKind, ArtifactStore, ChatProvider, CleaningError, CleaningMode, CleaningOrchestrator,
    CleaningState, DatasetId, FsArtifactStore, PipelineConfig, QaReporter,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

/// Stub provider answering with a fixed analysis for JSON-mode calls and a
/// caller-supplied responder for free-text calls.
struct StubProvider<F> {
    respond: F,
    calls: AtomicUsize,
}

impl<F> StubProvider<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> ChatProvider for StubProvider<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn complete(&self, _system: &str, user: &str, json_mode: bool) -> datamend::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if json_mode {
            return Ok(r#"{
                "issues": [
                    {"type": "inconsistent_category", "column": "diagnosis",
                     "suggestion": "map variants to canonical names"}
                ],
                "mapping": {"terminology": {"diagnosis": {"flu ": "Influenza"}}}
            }"#
            .to_string());
        }
        Ok((self.respond)(user))
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Responder that turns a generation request into a `cp` one-liner moving
/// the input table to the reserved output path. The command is also valid
/// under the syntax checker, so it flows through the whole generation path.
fn copy_through(user: &str) -> String {
    let ctx: serde_json::Value = serde_json::from_str(user).expect("context payload is JSON");
    let src = ctx["src_path"]
        .as_str()
        .or_else(|| ctx["cleaned_path"].as_str())
        .expect("context names an input path");
    let out = ctx["out_path"].as_str().expect("context names an output path");
    format!("cp {src} {out}\n")
}

fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn sample_csv(dir: &TempDir) -> PathBuf {
    write_csv(
        dir,
        "patients.csv",
        "patient_id,diagnosis,visit\n1,flu ,2023-01-05 14:30:00\n2,Influenza,2023-02-10 09:00:00\n3,flu ,2023-03-01 16:45:00\n",
    )
}

fn pipeline<F>(
    dir: &TempDir,
    provider: Arc<StubProvider<F>>,
    mode: CleaningMode,
    timeout_secs: u64,
) -> (Arc<FsArtifactStore>, CleaningOrchestrator)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let config = PipelineConfig::builder()
        .store_dir(dir.path().join("store"))
        .interpreter("sh")
        .script_timeout_secs(timeout_secs)
        .cleaning_mode(mode)
        .build()
        .unwrap();
    let store = Arc::new(FsArtifactStore::new(&config.store_dir).unwrap());
    let orchestrator = CleaningOrchestrator::new(store.clone(), provider, config);
    (store, orchestrator)
}

// ============================================================================
// Full Pipeline Tests
// ============================================================================

#[test]
fn test_full_pipeline_script_mode() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(copy_through));
    let (store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    assert!(store.get(id, ArtifactKind::RawUpload).is_some());

    let summary = orchestrator.analyze(id).unwrap();
    assert_eq!(summary.profile.rows, 3);
    assert_eq!(summary.analysis.issues.len(), 1);
    assert_eq!(
        summary.analysis.mapping.terminology["diagnosis"]["flu "],
        "Influenza"
    );

    let result = orchestrator.clean(id).unwrap();
    assert!(result.cleaned_path.exists());
    assert!(result.script_path.as_ref().unwrap().exists());
    assert!(result.program.unwrap().valid);
    assert_eq!(store.get(id, ArtifactKind::CleanedTable), Some(result.cleaned_path.clone()));

    // A copy-through transform changes nothing about the shape.
    assert_eq!(result.metrics.row_delta(), 0);
    assert_eq!(result.metrics.column_delta(), 0);
    assert_eq!(orchestrator.state(id), CleaningState::Committed);
}

#[test]
fn test_metrics_measured_by_rereading() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(copy_through));
    let (_store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let mut content = String::from("a,b,c,d,e\n");
    for i in 0..100 {
        content.push_str(&format!("{i},{i},{i},{i},{i}\n"));
    }
    let id = orchestrator.upload(&write_csv(&tmp, "wide.csv", &content)).unwrap();

    let result = orchestrator.clean(id).unwrap();
    assert_eq!(result.metrics.rows_before, 100);
    assert_eq!(result.metrics.columns_before, 5);
    assert_eq!(result.metrics.rows_after, 100);
    assert_eq!(result.metrics.columns_after, 5);

    let metrics = orchestrator.metrics(id).unwrap();
    assert_eq!(metrics.row_delta(), 0);
}

#[test]
fn test_direct_records_mode() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(|user: &str| {
        // The cleaning request carries the profile, the analysis, and the rows.
        assert!(user.contains("\"profile\""), "payload: {user}");
        assert!(user.contains("\"records\""), "payload: {user}");
        r#"[
            {"patient_id": "1", "diagnosis": "Influenza"},
            {"patient_id": "2", "diagnosis": "Influenza"}
        ]"#
        .to_string()
    }));
    let (store, orchestrator) = pipeline(&tmp, provider, CleaningMode::DirectRecords, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let result = orchestrator.clean(id).unwrap();

    // No script is generated or executed in this mode.
    assert!(result.script_path.is_none());
    assert!(result.program.is_none());
    assert!(store.get(id, ArtifactKind::GeneratedScript).is_none());

    assert_eq!(result.metrics.rows_before, 3);
    assert_eq!(result.metrics.rows_after, 2);
    assert_eq!(result.metrics.columns_after, 2);
}

#[test]
fn test_master_pass_produces_final_table() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(copy_through));
    let (store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    orchestrator.clean(id).unwrap();

    let result = orchestrator.master(id).unwrap();
    assert!(result.cleaned_path.exists());
    assert_eq!(store.get(id, ArtifactKind::FinalTable), Some(result.cleaned_path));
    assert!(store.get(id, ArtifactKind::MasterScript).is_some());
    // The earlier cleaning script is kept alongside the master script.
    assert!(store.get(id, ArtifactKind::GeneratedScript).is_some());
}

#[test]
fn test_master_requires_cleaned_table() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(copy_through));
    let (_store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let err = orchestrator.master(id).unwrap_err();
    assert_eq!(err.error_code(), "MISSING_ARTIFACT");
}

// ============================================================================
// Generation Retry Tests
// ============================================================================

#[test]
fn test_invalid_code_retried_exactly_once_then_succeeds() {
    let tmp = TempDir::new().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_stub = attempts.clone();
    let provider = Arc::new(StubProvider::new(move |user: &str| {
        // First attempt returns unclosed-bracket garbage, second a real script.
        if attempts_in_stub.fetch_add(1, Ordering::SeqCst) == 0 {
            "df = read(\n".to_string()
        } else {
            copy_through(user)
        }
    }));
    let (_store, orchestrator) = pipeline(&tmp, provider.clone(), CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let result = orchestrator.clean(id).unwrap();

    assert!(result.cleaned_path.exists());
    assert_eq!(provider.call_count(), 2);
}

#[test]
fn test_invalid_after_retry_surfaces_error_without_execution() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(|_user: &str| "df = read(\n".to_string()));
    let (store, orchestrator) = pipeline(&tmp, provider.clone(), CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let err = orchestrator.clean(id).unwrap_err();

    assert_eq!(err.error_code(), "SYNTAX_INVALID");
    // Exactly the initial attempt plus one retry, never a third call.
    assert_eq!(provider.call_count(), 2);
    // Nothing was executed, so nothing was committed.
    assert!(store.get(id, ArtifactKind::CleanedTable).is_none());
}

// ============================================================================
// Execution Failure Tests
// ============================================================================

#[test]
fn test_script_failure_reports_exit_status() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(|_user: &str| "exit 3\n".to_string()));
    let (store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let err = orchestrator.clean(id).unwrap_err();

    match err {
        CleaningError::ExecutionFailed { exit_status, .. } => assert_eq!(exit_status, 3),
        other => panic!("expected ExecutionFailed, got {other:?}"),
    }
    assert!(store.get(id, ArtifactKind::CleanedTable).is_none());
    assert_eq!(orchestrator.state(id), CleaningState::Failed);
}

#[test]
fn test_runaway_script_is_killed_at_timeout() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(|_user: &str| "sleep 30\n".to_string()));
    let (_store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 1);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();

    let started = Instant::now();
    let err = orchestrator.clean(id).unwrap_err();
    let elapsed = started.elapsed();

    match err {
        CleaningError::ExecutionFailed { exit_status, stderr } => {
            assert_eq!(exit_status, 124);
            assert!(stderr.contains("timed out"), "stderr: {stderr}");
        }
        other => panic!("expected ExecutionFailed, got {other:?}"),
    }
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
}

#[test]
fn test_successful_exit_without_output_is_not_committed() {
    let tmp = TempDir::new().unwrap();
    // The script exits 0 but never writes the cleaned table.
    let provider = Arc::new(StubProvider::new(|_user: &str| "true\n".to_string()));
    let (store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let err = orchestrator.clean(id).unwrap_err();

    assert_eq!(err.error_code(), "MISSING_ARTIFACT");
    assert!(store.get(id, ArtifactKind::CleanedTable).is_none());
}

#[test]
fn test_rerun_without_output_fails_and_keeps_previous_table() {
    let tmp = TempDir::new().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_stub = attempts.clone();
    // First attempt produces the cleaned table; the second exits 0 without
    // writing anything.
    let provider = Arc::new(StubProvider::new(move |user: &str| {
        if attempts_in_stub.fetch_add(1, Ordering::SeqCst) == 0 {
            copy_through(user)
        } else {
            "true\n".to_string()
        }
    }));
    let (store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let first = orchestrator.clean(id).unwrap();
    let committed_content = std::fs::read_to_string(&first.cleaned_path).unwrap();

    // The stale table from the first attempt must not make the second one
    // look committed.
    let err = orchestrator.clean(id).unwrap_err();
    assert_eq!(err.error_code(), "MISSING_ARTIFACT");
    assert_eq!(orchestrator.state(id), CleaningState::Failed);

    // The previously committed table survives the failed re-run untouched.
    let kept = store.get(id, ArtifactKind::CleanedTable).unwrap();
    assert_eq!(std::fs::read_to_string(kept).unwrap(), committed_content);
}

#[test]
fn test_clean_without_upload_fails() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(copy_through));
    let (_store, orchestrator) = pipeline(&tmp, provider, CleaningMode::Script, 30);

    let err = orchestrator.clean(DatasetId::new()).unwrap_err();
    assert_eq!(err.error_code(), "MISSING_ARTIFACT");
}

// ============================================================================
// Reporting and Lifecycle Tests
// ============================================================================

#[test]
fn test_report_generated_after_clean() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(|user: &str| {
        if user.contains("\"metrics\"") {
            "No remaining quality issues.".to_string()
        } else {
            copy_through(user)
        }
    }));
    let (store, orchestrator) = pipeline(&tmp, provider.clone(), CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    orchestrator.clean(id).unwrap();

    let reporter = QaReporter::new(store.clone(), provider);
    let report = reporter.generate(id).unwrap();

    assert_eq!(store.get(id, ArtifactKind::Report), Some(report.path.clone()));
    assert_eq!(std::fs::read_to_string(&report.path).unwrap(), report.text);
    assert!(report.text.contains("# Data Cleaning QA Report"));
    assert!(report.text.contains(&id.to_string()));
    assert!(report.text.contains("No remaining quality issues."));
}

#[test]
fn test_report_requires_cleaned_table() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(copy_through));
    let (store, orchestrator) = pipeline(&tmp, provider.clone(), CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    let err = QaReporter::new(store, provider).generate(id).unwrap_err();
    assert_eq!(err.error_code(), "MISSING_ARTIFACT");
}

#[test]
fn test_delete_artifacts_removes_everything() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(|user: &str| {
        if user.contains("\"metrics\"") {
            "Looks clean.".to_string()
        } else {
            copy_through(user)
        }
    }));
    let (store, orchestrator) = pipeline(&tmp, provider.clone(), CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    orchestrator.analyze(id).unwrap();
    orchestrator.clean(id).unwrap();
    QaReporter::new(store.clone(), provider).generate(id).unwrap();

    orchestrator.delete_artifacts(id).unwrap();
    for kind in ArtifactKind::ALL {
        assert!(store.get(id, kind).is_none(), "{kind:?} survived deletion");
    }
}

#[test]
fn test_clean_without_prior_analysis_uses_empty_analysis() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(StubProvider::new(copy_through));
    let (_store, orchestrator) = pipeline(&tmp, provider.clone(), CleaningMode::Script, 30);

    let id = orchestrator.upload(&sample_csv(&tmp)).unwrap();
    // No analyze() call: cleaning still works with an empty issue list,
    // and only the generation call is made.
    let result = orchestrator.clean(id).unwrap();
    assert!(result.cleaned_path.exists());
    assert_eq!(provider.call_count(), 1);
}

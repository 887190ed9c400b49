//! Dataset Cleaning Pipeline Library
//!
//! An AI-assisted cleaning pipeline for messy tabular data, built with Rust
//! and Polars.
//!
//! # Overview
//!
//! This library turns an uploaded CSV/TSV file into a cleaned table through
//! a sequence of stages:
//!
//! - **Artifact Store**: Every upload gets an opaque identifier scoping all
//!   derived artifacts (scripts, cleaned tables, reports)
//! - **Profiling**: Per-column summaries with null accounting, sample values,
//!   and latent-type detection
//! - **Analysis**: A generation service detects quality issues and proposes
//!   a terminology mapping
//! - **Code Generation**: The service writes a Python cleaning script, which
//!   is extracted, syntax-checked, and regenerated once on failure
//! - **Sandboxed Execution**: Scripts run as isolated subprocesses under a
//!   hard timeout
//! - **QA Reporting**: Before/after comparison rendered as a Markdown report
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use datamend::{CleaningOrchestrator, FsArtifactStore, OpenAiProvider, PipelineConfig};
//! use datamend::llm::OpenAiConfig;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::builder()
//!     .store_dir("app_data")
//!     .script_timeout_secs(300)
//!     .build()?;
//!
//! let store = Arc::new(FsArtifactStore::new(&config.store_dir)?);
//! let provider = Arc::new(OpenAiProvider::from_env(OpenAiConfig::default())?);
//! let orchestrator = CleaningOrchestrator::new(store, provider, config);
//!
//! let id = orchestrator.upload("patients.csv".as_ref())?;
//! let summary = orchestrator.analyze(id)?;
//! println!("detected {} issues", summary.analysis.issues.len());
//!
//! let result = orchestrator.clean(id)?;
//! println!("cleaned table at {}", result.cleaned_path.display());
//! ```
//!
//! # Generation Providers
//!
//! The pipeline talks to its generation service through the
//! [`llm::ChatProvider`] trait; [`llm::OpenAiProvider`] implements it against
//! the OpenAI chat-completions API or any compatible endpoint. Tests swap in
//! stub providers.

pub mod codegen;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod profiler;
pub mod reader;
pub mod report;
pub mod sandbox;
pub mod store;

// Re-exports for convenient access
pub use codegen::{
    extract_code, validate_python, Analysis, AnalysisOutcome, GeneratedProgram, Issue,
    TerminologyMapping, TransformGenerator, Validity,
};
pub use config::{CleaningMode, ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{CleaningError, Result, ResultExt};
pub use llm::{ChatProvider, OpenAiConfig, OpenAiProvider};
pub use orchestrator::{
    AnalysisSummary, CleaningMetrics, CleaningOrchestrator, CleaningResult, CleaningState,
};
pub use profiler::{profile_table, ColumnProfile, TableProfile};
pub use reader::read_table;
pub use report::{QaReport, QaReporter};
pub use sandbox::{ExecutionOutcome, ScriptRunner};
pub use store::{ArtifactKind, ArtifactStore, DatasetId, FsArtifactStore};

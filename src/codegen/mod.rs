//! Code generation, extraction, and validation.
//!
//! This is the heart of the pipeline: turning a generation-service response
//! into a script the sandbox can run. Extraction and validation are total
//! functions (they never fail, they report); the generator drives the
//! extract → validate → single-retry loop.

mod extract;
mod generator;
mod validate;

pub use extract::extract_code;
pub use generator::{
    Analysis, AnalysisOutcome, GeneratedProgram, Issue, MasterContext, TerminologyMapping,
    TransformContext, TransformGenerator,
};
pub use validate::{validate_python, Validity};

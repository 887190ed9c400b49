//! Transform generation.
//!
//! Builds the profiling and issue context, invokes the generation service,
//! and drives the extract → validate → retry loop. Analysis degrades to an
//! empty result when the service fails or returns garbage; transform
//! generation retries exactly once on invalid syntax and then surfaces
//! whatever it has.

use crate::codegen::{extract_code, validate_python};
use crate::error::{CleaningError, Result};
use crate::llm::ChatProvider;
use crate::profiler::TableProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// System instruction for the issue-detection / terminology-mapping call.
const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a senior data-quality analyst specializing in messy tabular datasets.
You will analyze the dataset summary and detect all quality issues.

Return STRICT JSON with this structure:
{
 \"issues\":[{\"type\":\"\",\"column\":\"\",\"suggestion\":\"\"}],
 \"mapping\":{\"terminology\":{column:{raw:canonical}}}
}

Guidelines:
- Detect inconsistent date formats; if a column mixes date+time, suggest splitting into separate date and time columns.
- Detect categorical columns with spelling mistakes, typos, inconsistent cases; suggest canonical values.
- Detect free-text columns with long text; suggest trimming and normalization if needed.
- Detect numeric columns stored as text; suggest conversion to numeric types.
- Detect IDs or keys with missing values; suggest removal if too sparse.
- Do NOT always fill missing values; only suggest a fill if it makes logical sense.
- For duplicates, suggest removing only if truly identical rows exist.
- For timestamps, standardize to UTC format if possible.
- For categorical codes, suggest a mapping if many variants exist.";

/// System instruction for cleaning-script generation.
const TRANSFORM_SYSTEM_PROMPT: &str = "\
You are a Python data engineer.
Return ONLY a complete Python script as plain text.
Do NOT include explanations, markdown, or triple backticks.

Rules for the script:
1. Must be valid Python code with no syntax errors.
2. Read the CSV from src_path.
3. mapping is a Python dictionary, not part of the DataFrame.
   - Use mapping.get('terminology', {}) to access terminology mappings.
   - Rename values only for columns that exist in the DataFrame.
4. Always check if a column exists before processing it; never raise if a column is absent.
5. For datetime columns:
   - Convert using pd.to_datetime(col, errors='coerce', utc=True).
   - If valid dates exist, create two columns: <col>_date (YYYY-MM-DD) and <col>_time (HH:MM:SS).
   - Drop the original column only if instructed, else keep it as string.
6. For mixed-type or object columns, safely cast to string before saving.
7. When filling null values, avoid chained assignment:
      df[col] = df[col].fillna('Unknown')
8. Avoid KeyErrors by always checking column existence first.
9. Print final row/col counts at the end.
10. Save the cleaned CSV to out_path.
11. The script must run without warnings or errors even if some columns don't exist.";

/// System instruction for the final validation-and-cleanup pass.
const MASTER_SYSTEM_PROMPT: &str = "\
You are a Senior Data Quality Engineer.
You will receive:
1. Raw dataset path (raw_path)
2. Cleaned dataset path (cleaned_path)

Your task:
- Validate whether cleaning was done properly by comparing raw and cleaned data.
- Detect any remaining data quality issues: inconsistent dates, missing categorical mappings, null handling errors, unexpected duplicates, mixed data types, typos in categories, improper column naming.
- For datetime columns: ensure they are split into <col>_date and <col>_time if applicable.
- Produce a FINAL dataset with no known data quality issues.

Rules:
1. Always check if a column exists before processing.
2. Apply fixes carefully without deleting useful data.
3. Ensure all date columns use ISO8601 for dates and standard 24hr time.
4. Convert mixed types into appropriate numeric, categorical, or string as needed.
5. Maintain consistent column names and casing.
6. Print the final dataset shape at the end.
7. Save the final dataset as CSV at out_path.
8. The script must run without errors even if columns are missing or formats are inconsistent.

Return ONLY the full Python script. No markdown, no explanation.";

/// One detected quality problem. Order is insertion order from the service
/// and is preserved end to end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type", default)]
    pub issue_type: String,
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Column name → (raw category value → canonical category value).
/// Columns absent from the mapping are left untouched by the transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminologyMapping {
    #[serde(default)]
    pub terminology: HashMap<String, HashMap<String, String>>,
}

/// Result of the issue-detection call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub mapping: TerminologyMapping,
}

/// Tagged outcome of the analysis call, instead of trusting key presence
/// at every call site.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Ok(Analysis),
    Malformed { raw: String },
    ServiceFailure { reason: String },
}

impl AnalysisOutcome {
    /// Collapse to an `Analysis`, degrading failures to the empty default
    /// so downstream stages keep working.
    pub fn into_analysis(self) -> Analysis {
        match self {
            Self::Ok(analysis) => analysis,
            Self::Malformed { raw } => {
                warn!("analysis response was not valid JSON, using empty result: {raw:.120}");
                Analysis::default()
            }
            Self::ServiceFailure { reason } => {
                warn!("analysis service failed, using empty result: {reason}");
                Analysis::default()
            }
        }
    }
}

/// A generated transformation program. Immutable once produced; regeneration
/// yields a new value rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProgram {
    pub source: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Context payload sent with the transform-generation request.
#[derive(Debug, Clone, Serialize)]
pub struct TransformContext {
    pub src_path: PathBuf,
    pub issues: Vec<Issue>,
    pub mapping: TerminologyMapping,
    pub out_path: PathBuf,
}

/// Context payload for the master pass.
#[derive(Debug, Clone, Serialize)]
pub struct MasterContext {
    pub raw_path: PathBuf,
    pub cleaned_path: PathBuf,
    pub out_path: PathBuf,
}

/// Drives analysis and script generation against a [`ChatProvider`].
pub struct TransformGenerator {
    provider: Arc<dyn ChatProvider>,
}

impl TransformGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    /// Ask the service for quality issues and a terminology mapping.
    ///
    /// Never returns an error: service failures and malformed responses are
    /// reported in the tagged outcome so the caller can degrade gracefully.
    pub fn analyze(&self, profile: &TableProfile) -> AnalysisOutcome {
        let payload = profile.to_payload().to_string();
        debug!(provider = self.provider.name(), "requesting dataset analysis");

        let response = match self.provider.complete(ANALYSIS_SYSTEM_PROMPT, &payload, true) {
            Ok(text) => text,
            Err(e) => {
                return AnalysisOutcome::ServiceFailure {
                    reason: e.to_string(),
                }
            }
        };

        match serde_json::from_str::<Analysis>(&response) {
            Ok(analysis) => AnalysisOutcome::Ok(analysis),
            Err(_) => AnalysisOutcome::Malformed { raw: response },
        }
    }

    /// Generate a cleaning transform for the given context.
    ///
    /// Issues at most two service calls: the initial attempt and, if the
    /// extracted code fails the syntax check, one stricter retry embedding
    /// the validator diagnostic. A second syntax failure is returned as an
    /// invalid [`GeneratedProgram`], never looped on.
    pub fn generate_transform(&self, ctx: &TransformContext) -> Result<GeneratedProgram> {
        let payload = serde_json::to_string(ctx)?;
        self.generate_with_retry(TRANSFORM_SYSTEM_PROMPT, &payload)
    }

    /// Generate the final validation-and-cleanup script for the master pass.
    pub fn generate_master(&self, ctx: &MasterContext) -> Result<GeneratedProgram> {
        let payload = serde_json::to_string(ctx)?;
        self.generate_with_retry(MASTER_SYSTEM_PROMPT, &payload)
    }

    fn generate_with_retry(&self, system: &str, payload: &str) -> Result<GeneratedProgram> {
        let response = self.provider.complete(system, payload, false)?;
        let code = extract_code(&response);
        let validity = validate_python(&code);

        if validity.valid {
            return Ok(GeneratedProgram {
                source: code,
                valid: true,
                diagnostic: None,
            });
        }

        warn!(
            "generated code failed syntax check, retrying once: {}",
            validity.diagnostic
        );

        let retry_system = format!(
            "Previous code had syntax errors: {}.\n\
             Return ONLY valid Python code as plain text. No markdown, no ``` fences.\n\
             Context: {}",
            validity.diagnostic, payload
        );
        let response = self.provider.complete(&retry_system, payload, false)?;
        let code = extract_code(&response);
        let validity = validate_python(&code);

        Ok(GeneratedProgram {
            source: code,
            valid: validity.valid,
            diagnostic: (!validity.valid).then_some(validity.diagnostic),
        })
    }
}

impl GeneratedProgram {
    /// Convert an invalid program into the orchestrator-level error.
    pub fn require_valid(self) -> Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(CleaningError::SyntaxInvalid(
                self.diagnostic
                    .unwrap_or_else(|| "unknown syntax error".to_string()),
            ))
        }
    }
}

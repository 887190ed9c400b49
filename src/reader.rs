//! Tabular file loading.
//!
//! Loads a raw or cleaned file into an in-memory `DataFrame`. Reading never
//! mutates anything; each call produces a fresh table. CSV loading tries a
//! sequence of fallback strategies because uploaded files are frequently
//! malformed around quoting.

use crate::error::{CleaningError, Result};
use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Read a tabular file into a `DataFrame`.
///
/// Recognized extensions are `.csv` and `.tsv`; anything else returns
/// [`CleaningError::UnsupportedFormat`].
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => load_csv_with_fallbacks(path, b','),
        "tsv" => load_csv_with_fallbacks(path, b'\t'),
        other => Err(CleaningError::UnsupportedFormat(format!(
            "'{}' (expected .csv or .tsv): {}",
            other,
            path.display()
        ))),
    }
}

/// Render the first `n` rows of a table for previews.
pub fn preview(df: &DataFrame, n: usize) -> String {
    format!("{}", df.head(Some(n)))
}

/// Load a delimited file with multiple fallback strategies.
fn load_csv_with_fallbacks(path: &Path, separator: u8) -> Result<DataFrame> {
    // Strategy 1: standard loading with quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(Some(b'"')),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("standard loading failed: {}", e);
        }
    }

    // Strategy 2: without quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(None),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("loading without quotes failed: {}", e);
        }
    }

    // Strategy 3: pre-clean the content
    let content = std::fs::read_to_string(path)?;
    let cleaned = clean_csv_content(&content);
    let cursor = Cursor::new(cleaned);

    CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .into_reader_with_file_handle(cursor)
        .finish()
        .map_err(CleaningError::Polars)
}

/// Normalize doubled quotes and drop blank lines.
fn clean_csv_content(content: &str) -> String {
    content
        .replace("\"\"\"", "\"")
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

//! Column profiling for the generation context.
//!
//! Produces the per-column summary that is serialized into the profiling
//! payload sent to the generation service: declared type, null accounting,
//! distinct counts, sample values, and latent-type flags. Profiles are
//! derived fresh on every call and never persisted on their own.

use crate::error::Result;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Pattern matching date-like fragments such as `2023-01-05` or `5/1/23`.
static DATE_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,4}[-/]\d{1,2}[-/]\d{1,4}").expect("valid date regex"));

/// Fraction of parseable values above which a text column is considered
/// numeric-looking.
const NUMERIC_RATIO_THRESHOLD: f64 = 0.8;

/// Derived, read-only summary of one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub nulls: usize,
    pub non_nulls: usize,
    pub unique: usize,
    pub sample_values: Vec<String>,
    pub max_len: usize,
    pub is_probably_date: bool,
    pub is_probably_numeric: bool,
}

/// Profile of a whole table: shape plus one profile per column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProfile {
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    /// Serialize the profile as the structured payload the generation
    /// service receives: a map of column name to summary.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut columns = serde_json::Map::new();
        for col in &self.columns {
            columns.insert(
                col.name.clone(),
                json!({
                    "dtype": col.dtype,
                    "nulls": col.nulls,
                    "non_nulls": col.non_nulls,
                    "unique": col.unique,
                    "sample_values": col.sample_values,
                    "max_len": col.max_len,
                    "is_probably_date": col.is_probably_date,
                    "is_probably_numeric": col.is_probably_numeric,
                }),
            );
        }
        json!({ "rows": self.rows, "columns": columns })
    }
}

/// Profile every column of a table.
///
/// `sample_values` caps the number of sample cells included per column.
pub fn profile_table(df: &DataFrame, sample_values: usize) -> Result<TableProfile> {
    let rows = df.height();
    let mut columns = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        let series = column.as_materialized_series();
        columns.push(profile_column(series, rows, sample_values)?);
    }

    Ok(TableProfile { rows, columns })
}

fn profile_column(series: &Series, row_count: usize, sample_values: usize) -> Result<ColumnProfile> {
    let nulls = series.null_count();
    let non_nulls = row_count - nulls;

    let non_null = series.drop_nulls();
    let unique = non_null.n_unique()?;

    // Work on the string rendering of the non-null cells, like the
    // profiling context the transform prompt expects.
    let as_strings = non_null.cast(&DataType::String)?;
    let chunked = as_strings.str()?;

    let mut samples = Vec::with_capacity(sample_values.min(non_null.len()));
    let mut max_len = 0usize;
    let mut numeric_hits = 0usize;

    for value in chunked.into_iter().flatten() {
        if samples.len() < sample_values {
            samples.push(value.to_string());
        }
        max_len = max_len.max(value.len());
        if value.trim().parse::<f64>().is_ok() {
            numeric_hits += 1;
        }
    }

    let is_probably_date = samples.iter().any(|s| DATE_LIKE.is_match(s));
    let is_probably_numeric = non_null.len() > 0
        && (numeric_hits as f64 / non_null.len() as f64) > NUMERIC_RATIO_THRESHOLD;

    Ok(ColumnProfile {
        name: series.name().to_string(),
        dtype: series.dtype().to_string(),
        nulls,
        non_nulls,
        unique,
        sample_values: samples,
        max_len,
        is_probably_date,
        is_probably_numeric,
    })
}

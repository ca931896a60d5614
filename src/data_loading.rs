use crate::Trace;
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const TABLE_EXTENSIONS: [&str; 4] = ["csv", "feather", "arrow", "ipc"];

fn is_table(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| TABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// The input itself when it is a file, otherwise every table below it in
/// path order
pub fn find_input_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input path does not exist: {}", input.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", input.display()))?;
        if entry.file_type().is_file() && is_table(entry.path()) {
            println!("Indexing file: {}", entry.path().display());
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        bail!("No CSV or Feather tables found in {}", input.display());
    }

    Ok(files)
}

/// Read a CSV (with header) or Arrow IPC / Feather table
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    let df = match ext.as_str() {
        "feather" | "arrow" | "ipc" => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open file: {}", path.display()))?;
            IpcReader::new(file)
                .finish()
                .with_context(|| format!("Failed to read Feather table: {}", path.display()))?
        }
        _ => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("Failed to open file: {}", path.display()))?
            .finish()
            .with_context(|| format!("Failed to parse CSV table: {}", path.display()))?,
    };

    debug!(
        "{}: {} rows x {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Numeric samples of one column. Trailing nulls (ragged columns) are
/// trimmed; interior nulls or non-numeric data are an error.
fn column_samples(series: &Series) -> Result<Vec<f64>> {
    let cast = series
        .strict_cast(&DataType::Float64)
        .with_context(|| format!("column is not numeric ({})", series.dtype()))?;
    let values: Vec<Option<f64>> = cast.f64()?.into_iter().collect();

    let end = values
        .iter()
        .rposition(Option::is_some)
        .map(|i| i + 1)
        .unwrap_or(0);

    let samples: Option<Vec<f64>> = values[..end]
        .iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    match samples {
        Some(samples) => Ok(samples),
        None => bail!("column has missing or non-finite values"),
    }
}

/// One trace per column. Malformed columns are kept as empty traces so the
/// subject still shows up in the results.
pub fn traces_from_frame(df: &DataFrame, exclude: &[String]) -> Vec<Trace> {
    df.get_columns()
        .iter()
        .map(|column| column.as_materialized_series())
        .filter(|series| !exclude.iter().any(|name| name == series.name().as_str()))
        .map(|series| {
            let subject = series.name().to_string();
            match column_samples(series) {
                Ok(samples) => Trace::new(subject, samples),
                Err(e) => {
                    warn!("Skipping data for subject {}: {:#}", subject, e);
                    Trace::new(subject, Vec::new())
                }
            }
        })
        .collect()
}

pub fn load_traces(path: &Path, exclude: &[String]) -> Result<Vec<Trace>> {
    let df = read_table(path)?;
    Ok(traces_from_frame(&df, exclude))
}

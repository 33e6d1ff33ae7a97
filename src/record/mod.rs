//! # Benchmark Record Writer
//!
//! Append-only CSV persistence for benchmark results. Each log kind has
//! one fixed schema (see [`schema`]); downstream analysis reads these
//! files positionally and by header, so column order is part of the
//! contract.
//!
//! ## Write discipline
//! - The header row is written once, only when the target file is
//!   missing or empty.
//! - Every append serializes the full batch (header included, when due)
//!   into memory first, then issues a single write on an append-mode
//!   handle. Concurrent writers therefore cannot interleave partial
//!   rows, and existing rows are never rewritten.
//! - A value that could not be measured is the literal `N/A`, never an
//!   empty cell.

pub mod schema;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{BenchError, BenchResult};

/// Sentinel written for values that were not measured.
pub const NA: &str = "N/A";

/// A row family with a fixed header.
pub trait CsvRecord {
    /// Canonical column names, in order.
    const HEADERS: &'static [&'static str];

    /// This row's cells; must match `HEADERS` in length and order.
    fn fields(&self) -> Vec<String>;
}

/// Append one record to `path`, creating the file (and header) if needed.
pub fn append_record<R: CsvRecord>(path: &Path, record: &R) -> BenchResult<()> {
    append_records(path, std::slice::from_ref(record))
}

/// Append a batch of records in one write. Used for per-GPU telemetry
/// rows, which must land together.
pub fn append_records<R: CsvRecord>(path: &Path, records: &[R]) -> BenchResult<()> {
    if records.is_empty() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BenchError::io("creating log directory", e))?;
        }
    }

    let needs_header = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len() == 0,
        Err(_) => true,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    if needs_header {
        writer.write_record(R::HEADERS)?;
    }
    for record in records {
        let fields = record.fields();
        debug_assert_eq!(fields.len(), R::HEADERS.len());
        writer.write_record(&fields)?;
    }
    writer.flush().map_err(|e| BenchError::io("serializing CSV rows", e))?;
    let buffer = writer
        .into_inner()
        .map_err(|e| BenchError::io("finalizing CSV buffer", e.into_error()))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BenchError::io("opening log file", e))?;
    file.write_all(&buffer)
        .map_err(|e| BenchError::io("appending log rows", e))?;

    debug!(path = %path.display(), rows = records.len(), "appended benchmark records");
    Ok(())
}

/// Format an optional measurement, substituting the `N/A` sentinel.
pub fn field_or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| NA.to_string(), |v| v.to_string())
}

/// Format an optional duration in seconds with millisecond precision.
pub fn secs_or_na(value: Option<f64>) -> String {
    value.map_or_else(|| NA.to_string(), |v| format!("{v:.3}"))
}

//! CSV export of an annotated series.
//!
//! Columns: date, open, high, low, close, volume, sma_20, sma_50, rsi_14.
//! Undefined indicator values are written as empty fields.

use crate::indicators::AnnotatedSeries;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

pub const CSV_HEADER: [&str; 9] = [
    "date", "open", "high", "low", "close", "volume", "sma_20", "sma_50", "rsi_14",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("export to {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

/// Write the annotated series as CSV, header first, one row per point.
pub fn write_csv<W: Write>(annotated: &AnnotatedSeries, writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;

    for row in annotated.rows() {
        let p = row.point;
        wtr.write_record([
            p.date.to_string(),
            format!("{:.6}", p.open),
            format!("{:.6}", p.high),
            format!("{:.6}", p.low),
            format!("{:.6}", p.close),
            p.volume.map(|v| v.to_string()).unwrap_or_default(),
            optional(row.sma_20),
            optional(row.sma_50),
            optional(row.rsi_14),
        ])?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Create (or truncate) `path` and write the CSV into it.
pub fn export_to_path(annotated: &AnnotatedSeries, path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_csv(annotated, std::io::BufWriter::new(file))
}

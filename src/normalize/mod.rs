//! Presentation step: filter a harvested result set and export it as CSV.
//!
//! Nothing here talks to the network; it works on records already written
//! by a harvest.

mod filter;
mod flatten;

pub use filter::{publication_year, RecordFilter};
pub use flatten::FlatRecord;

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::models::Record;

/// Byte order mark so spreadsheet tools detect UTF-8
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors from the normalize step
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of filtering a result set
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeReport {
    pub input_records: usize,
    pub rows: Vec<FlatRecord>,
    /// `contentType` counts before filtering
    pub types_before: Vec<(String, usize)>,
    /// `contentType` counts among kept records
    pub types_after: Vec<(String, usize)>,
}

impl NormalizeReport {
    pub fn removed(&self) -> usize {
        self.input_records - self.rows.len()
    }
}

/// Filter and flatten `records`
pub fn normalize(records: &[Record], filter: &RecordFilter) -> NormalizeReport {
    let kept: Vec<&Record> = records.iter().filter(|r| filter.accepts(r)).collect();
    NormalizeReport {
        input_records: records.len(),
        types_before: breakdown(records.iter(), "contentType"),
        types_after: breakdown(kept.iter().copied(), "contentType"),
        rows: kept.into_iter().map(FlatRecord::from_record).collect(),
    }
}

/// Counts of each value of `field`, most frequent first
///
/// Records lacking the field are counted as `Unknown`.
pub fn breakdown<'a>(records: impl IntoIterator<Item = &'a Record>, field: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        let value = record.str_field(field).unwrap_or_else(|| "Unknown".to_string());
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Write rows as CSV with a header, quoting every text field
pub fn write_csv(path: &Path, rows: &[FlatRecord]) -> Result<(), NormalizeError> {
    let io_error = |source| NormalizeError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut file = std::fs::File::create(path).map_err(io_error)?;
    file.write_all(UTF8_BOM).map_err(io_error)?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_writer(file);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(io_error)?;
    tracing::info!("Saved {} rows to {}", rows.len(), path.display());
    Ok(())
}

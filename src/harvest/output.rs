//! Persisting harvest artifacts.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::HarvestError;
use crate::config::OutputConfig;
use crate::models::{AuditLog, EnrichedRecord, HarvestSummary, Record};

/// Writes run artifacts into one directory
///
/// Every file is written to a temporary file in the same directory and then
/// renamed over the target, so a crash never leaves a truncated artifact.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    files: OutputConfig,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, files: OutputConfig) -> Self {
        Self {
            dir: dir.into(),
            files,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and make sure it accepts new files
    pub fn prepare(&self) -> Result<(), HarvestError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| self.io_error(&self.dir, e))?;
        let probe = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| self.io_error(&self.dir, e))?;
        probe.close().map_err(|e| self.io_error(&self.dir, e))?;
        Ok(())
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(&self.files.results_file)
    }

    pub fn enriched_path(&self) -> PathBuf {
        self.dir.join(&self.files.enriched_file)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.dir.join(&self.files.audit_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(&self.files.summary_file)
    }

    pub fn write_results(&self, records: &[Record]) -> Result<PathBuf, HarvestError> {
        self.write_json(self.results_path(), &records)
    }

    pub fn write_enriched(&self, records: &[EnrichedRecord]) -> Result<PathBuf, HarvestError> {
        self.write_json(self.enriched_path(), &records)
    }

    pub fn write_audit(&self, audit: &AuditLog) -> Result<PathBuf, HarvestError> {
        self.write_atomic(self.audit_path(), audit.render().as_bytes())
    }

    pub fn write_summary(&self, summary: &HarvestSummary) -> Result<PathBuf, HarvestError> {
        self.write_json(self.summary_path(), summary)
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: PathBuf, value: &T) -> Result<PathBuf, HarvestError> {
        let mut content = serde_json::to_vec_pretty(value)?;
        content.push(b'\n');
        self.write_atomic(path, &content)
    }

    fn write_atomic(&self, path: PathBuf, content: &[u8]) -> Result<PathBuf, HarvestError> {
        let mut file = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| self.io_error(&path, e))?;
        file.write_all(content).map_err(|e| self.io_error(&path, e))?;
        file.persist(&path).map_err(|e| self.io_error(&path, e.error))?;
        tracing::info!("Saved {}", path.display());
        Ok(path)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> HarvestError {
        HarvestError::Output {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read a JSON array of records written by a previous run
pub fn read_records(path: &Path) -> Result<Vec<Record>, HarvestError> {
    let content = std::fs::read_to_string(path).map_err(|source| HarvestError::Input {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| HarvestError::Input {
        path: path.to_path_buf(),
        message: format!("expected a JSON array of objects: {}", e),
    })
}

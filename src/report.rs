//! Structured run summary written beside the bundle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::dataset::{DatasetError, DatasetIssue, DatasetRecord, DatasetReference};
use crate::gate::{GateOutcome, GateState, RelocatedArtifact};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize run report: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write run report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Final state of one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    /// Metadata saved and download relocated.
    Complete,
    /// Folder exists, but metadata or download is missing.
    Partial,
    /// Nothing usable; no folder.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub url: DatasetReference,
    pub status: DatasetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_file: Option<PathBuf>,
    /// Terminal gate state; absent when the gate never started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_state: Option<GateState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha_attempts: Option<u32>,
    pub artifacts: Vec<RelocatedArtifact>,
    pub issues: Vec<DatasetIssue>,
}

impl DatasetSummary {
    #[must_use]
    pub fn from_record(record: &DatasetRecord) -> Self {
        let status = if record.is_complete() {
            DatasetStatus::Complete
        } else {
            DatasetStatus::Partial
        };
        let (artifacts, captcha_attempts) = match &record.gate {
            Some(GateOutcome::Relocated {
                artifacts,
                attempts,
                ..
            }) => (artifacts.clone(), Some(*attempts)),
            _ => (Vec::new(), None),
        };

        Self {
            url: record.reference.clone(),
            status,
            name: Some(record.display_name.clone()),
            folder: Some(record.folder.clone()),
            metadata_file: record.metadata_file.clone(),
            gate_state: record.gate.as_ref().map(GateOutcome::state),
            captcha_attempts,
            artifacts,
            issues: record.issues.clone(),
        }
    }

    #[must_use]
    pub fn failed(reference: &DatasetReference, error: &DatasetError) -> Self {
        Self {
            url: reference.clone(),
            status: DatasetStatus::Failed,
            name: None,
            folder: None,
            metadata_file: None,
            gate_state: None,
            captcha_attempts: None,
            artifacts: Vec::new(),
            issues: vec![DatasetIssue::from_error(error)],
        }
    }
}

/// Everything a run did, in a form that serializes to the JSON report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub base_url: String,
    pub first_page: u32,
    pub last_page: u32,
    pub pages_visited: u32,
    /// Listing pages that still failed after retries.
    pub pages_failed: u32,
    /// Paging ended before `last_page`.
    pub stopped_early: bool,
    pub links_discovered: usize,
    pub duplicates_skipped: usize,
    pub datasets: Vec<DatasetSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn count(&self, status: DatasetStatus) -> usize {
        self.datasets.iter().filter(|d| d.status == status).count()
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(DatasetStatus::Complete)
    }

    #[must_use]
    pub fn partial(&self) -> usize {
        self.count(DatasetStatus::Partial)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(DatasetStatus::Failed)
    }

    /// Datasets that produced a folder.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.datasets.len() - self.failed()
    }
}

/// Writes `summary` as pretty-printed JSON to `path`.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or the write fails.
#[instrument(skip(summary), fields(path = %path.display()))]
pub fn write_report(summary: &RunSummary, path: &Path) -> Result<(), ReportError> {
    let mut json = serde_json::to_vec_pretty(summary).map_err(ReportError::Serialize)?;
    json.push(b'\n');
    fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(datasets = summary.datasets.len(), "run report written");
    Ok(())
}

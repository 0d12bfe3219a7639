//! Per-dataset error taxonomy.
//!
//! Every variant carries enough context (dataset name, URL, or path) to be
//! logged on its own. None of these escape the dataset boundary: the processor
//! either returns them as a hard failure for one dataset or records them as
//! issues on a partially complete record.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::gate::GateState;
use crate::session::RenderError;

/// Errors that can occur while acquiring one dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The detail page could not be rendered.
    #[error("failed to load dataset page {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: RenderError,
    },

    /// Heading or metadata panel missing or unreadable.
    #[error("metadata error for {dataset}: {reason}")]
    Metadata { dataset: String, reason: String },

    /// No download control on the detail page.
    #[error("no download trigger found for {dataset}")]
    DownloadTrigger { dataset: String },

    /// The request form never appeared after the trigger click.
    #[error("request form did not appear for {dataset} within {waited_ms}ms")]
    FormTimeout { dataset: String, waited_ms: u64 },

    /// The recognizer failed or produced no text.
    #[error("captcha decode failed for {dataset}: {reason}")]
    CaptchaDecode { dataset: String, reason: String },

    /// Staging could not be read or a file could not be moved.
    #[error("failed to relocate {path}: {source}")]
    Relocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nothing materialized in staging after submit.
    #[error("no download arrived for {dataset} within {waited_ms}ms")]
    NoArtifact { dataset: String, waited_ms: u64 },

    /// A form element was missing or an interaction failed.
    #[error("{state} failed for {dataset}: {source}")]
    Interaction {
        dataset: String,
        state: GateState,
        #[source]
        source: RenderError,
    },

    /// Folder or metadata file I/O failed.
    #[error("IO error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl DatasetError {
    pub fn navigation(url: impl Into<String>, source: RenderError) -> Self {
        Self::Navigation {
            url: url.into(),
            source,
        }
    }

    pub fn metadata(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Metadata {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    pub fn download_trigger(dataset: impl Into<String>) -> Self {
        Self::DownloadTrigger {
            dataset: dataset.into(),
        }
    }

    pub fn form_timeout(dataset: impl Into<String>, waited: Duration) -> Self {
        Self::FormTimeout {
            dataset: dataset.into(),
            waited_ms: millis(waited),
        }
    }

    pub fn captcha_decode(dataset: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::CaptchaDecode {
            dataset: dataset.into(),
            reason: reason.to_string(),
        }
    }

    pub fn relocation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Relocation {
            path: path.into(),
            source,
        }
    }

    pub fn no_artifact(dataset: impl Into<String>, waited: Duration) -> Self {
        Self::NoArtifact {
            dataset: dataset.into(),
            waited_ms: millis(waited),
        }
    }

    pub fn interaction(dataset: impl Into<String>, state: GateState, source: RenderError) -> Self {
        Self::Interaction {
            dataset: dataset.into(),
            state,
            source,
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Navigation { .. } => FailureCategory::Navigation,
            Self::Metadata { .. } => FailureCategory::Metadata,
            Self::DownloadTrigger { .. }
            | Self::FormTimeout { .. }
            | Self::CaptchaDecode { .. }
            | Self::NoArtifact { .. }
            | Self::Interaction { .. } => FailureCategory::Gate,
            Self::Relocation { .. } | Self::Filesystem { .. } => FailureCategory::Filesystem,
        }
    }
}

/// Coarse grouping used in summaries and the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Navigation,
    Metadata,
    Gate,
    Filesystem,
}

impl FailureCategory {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Navigation => "Navigation",
            Self::Metadata => "Metadata",
            Self::Gate => "Download gate",
            Self::Filesystem => "Filesystem",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

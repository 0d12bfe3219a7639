//! Dataset references, per-dataset records, and the processor that produces them.

mod error;
pub mod processor;
mod sanitize;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use url::Url;

use crate::gate::GateOutcome;

pub use error::{DatasetError, FailureCategory};
pub use processor::DatasetProcessor;
pub use sanitize::sanitize_dataset_name;

/// Opaque detail-page URL. Identity is the URL string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DatasetReference(Url);

impl DatasetReference {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for DatasetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<Url> for DatasetReference {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

/// A non-fatal problem recorded while processing one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetIssue {
    pub category: FailureCategory,
    pub message: String,
}

impl DatasetIssue {
    #[must_use]
    pub fn from_error(error: &DatasetError) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Everything produced for one dataset whose folder exists.
#[derive(Debug)]
pub struct DatasetRecord {
    pub reference: DatasetReference,
    /// Heading text as displayed.
    pub display_name: String,
    /// Filesystem-safe form of the name; also the folder name.
    pub name: String,
    pub folder: PathBuf,
    /// `None` when the metadata panel was missing or could not be saved.
    pub metadata_text: Option<String>,
    pub metadata_file: Option<PathBuf>,
    /// `None` when the page had no download trigger.
    pub gate: Option<GateOutcome>,
    pub issues: Vec<DatasetIssue>,
}

impl DatasetRecord {
    /// True when metadata was saved and at least one artifact relocated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.metadata_file.is_some()
            && self
                .gate
                .as_ref()
                .is_some_and(|gate| gate.is_relocated())
    }
}

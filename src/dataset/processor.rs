//! Per-dataset acquisition: detail page, metadata file, and download gate.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use super::{
    DatasetError, DatasetIssue, DatasetRecord, DatasetReference, sanitize_dataset_name,
};
use crate::config::{HarvestSettings, PortalLayout, STAGING_DIR_NAME, WaitSettings};
use crate::gate::{DownloadGate, GateState, StagingArea};
use crate::recognizer::TextRecognizer;
use crate::session::{PageSession, wait_for};

/// Suffix of the metadata file written into each dataset folder.
const METADATA_SUFFIX: &str = "_metadata.txt";

/// Appended to a dataset name that would collide with the staging root.
const RESERVED_NAME_SUFFIX: &str = "_dataset";

/// Turns one [`DatasetReference`] into a [`DatasetRecord`].
#[derive(Debug, Clone)]
pub struct DatasetProcessor {
    output_root: PathBuf,
    staging_root: PathBuf,
    layout: PortalLayout,
    waits: WaitSettings,
    gate: DownloadGate,
}

impl DatasetProcessor {
    #[must_use]
    pub fn new(settings: &HarvestSettings) -> Self {
        Self {
            output_root: settings.output_dir.clone(),
            staging_root: settings.staging_root(),
            layout: settings.layout.clone(),
            waits: settings.waits,
            gate: DownloadGate::new(
                settings.layout.clone(),
                settings.requester.clone(),
                settings.waits,
                settings.captcha_attempts,
            ),
        }
    }

    /// Processes one dataset.
    ///
    /// Metadata and download are independent: a failure in either is recorded
    /// on the returned record as an issue.
    ///
    /// # Errors
    ///
    /// Fails only when nothing usable exists: the page didn't load, it has no
    /// title, or the dataset folder couldn't be created.
    #[instrument(skip(self, session, recognizer, reference), fields(url = %reference))]
    pub async fn process(
        &self,
        session: &mut dyn PageSession,
        recognizer: &dyn TextRecognizer,
        reference: &DatasetReference,
    ) -> Result<DatasetRecord, DatasetError> {
        session
            .navigate(reference.as_str(), self.waits.navigation_timeout)
            .await
            .map_err(|e| DatasetError::navigation(reference.as_str(), e))?;

        let display_name = self.read_title(&*session, reference).await?;
        let name = folder_name(&display_name);
        let folder = self.output_root.join(&name);
        fs::create_dir_all(&folder).map_err(|e| DatasetError::filesystem(&folder, e))?;
        debug!(dataset = %display_name, folder = %folder.display(), "dataset folder ready");

        let mut record = DatasetRecord {
            reference: reference.clone(),
            display_name,
            name,
            folder,
            metadata_text: None,
            metadata_file: None,
            gate: None,
            issues: Vec::new(),
        };

        self.save_metadata(&*session, &mut record).await;
        self.run_gate(session, recognizer, &mut record).await;

        if record.issues.is_empty() {
            info!(dataset = %record.display_name, "dataset complete");
        } else {
            info!(
                dataset = %record.display_name,
                issues = record.issues.len(),
                "dataset partially complete"
            );
        }
        Ok(record)
    }

    async fn read_title(
        &self,
        session: &dyn PageSession,
        reference: &DatasetReference,
    ) -> Result<String, DatasetError> {
        let heading = wait_for(session, &self.layout.title, &self.waits.settle_policy())
            .await
            .map_err(|e| DatasetError::metadata(reference.as_str(), e.to_string()))?
            .ok_or_else(|| DatasetError::metadata(reference.as_str(), "page has no title"))?;
        let title = heading
            .text()
            .await
            .map_err(|e| DatasetError::metadata(reference.as_str(), e.to_string()))?;

        let title = title.trim();
        if title.is_empty() {
            return Err(DatasetError::metadata(reference.as_str(), "title is empty"));
        }
        Ok(title.to_string())
    }

    async fn save_metadata(&self, session: &dyn PageSession, record: &mut DatasetRecord) {
        let dataset = record.display_name.as_str();
        let text = match session.find(&self.layout.metadata_panel).await {
            Ok(Some(panel)) => panel.text().await,
            Ok(None) => {
                record_issue(
                    &mut record.issues,
                    DatasetError::metadata(dataset, "metadata panel not found"),
                );
                return;
            }
            Err(e) => Err(e),
        };
        let text = match text {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                record_issue(
                    &mut record.issues,
                    DatasetError::metadata(dataset, e.to_string()),
                );
                return;
            }
        };

        let path = record
            .folder
            .join(format!("{}{METADATA_SUFFIX}", record.name));
        match fs::write(&path, text.as_bytes()) {
            Ok(()) => {
                debug!(dataset, path = %path.display(), "metadata saved");
                record.metadata_file = Some(path);
            }
            Err(e) => record_issue(
                &mut record.issues,
                DatasetError::metadata(dataset, format!("failed to write {}: {e}", path.display())),
            ),
        }
        record.metadata_text = Some(text);
    }

    async fn run_gate(
        &self,
        session: &mut dyn PageSession,
        recognizer: &dyn TextRecognizer,
        record: &mut DatasetRecord,
    ) {
        let dataset = record.display_name.clone();

        let trigger = match session.find(&self.layout.download_trigger).await {
            Ok(Some(trigger)) => trigger,
            Ok(None) => {
                record_issue(&mut record.issues, DatasetError::download_trigger(&dataset));
                return;
            }
            Err(e) => {
                debug!(dataset = %dataset, error = %e, "download trigger query failed");
                record_issue(&mut record.issues, DatasetError::download_trigger(&dataset));
                return;
            }
        };

        let staging_dir = self.staging_root.join(&record.name);
        let staging = match StagingArea::prepare(&staging_dir) {
            Ok(staging) => staging,
            Err(e) => {
                record_issue(&mut record.issues, DatasetError::filesystem(staging_dir, e));
                return;
            }
        };

        let opened = match session.set_download_dir(staging.path()).await {
            Ok(()) => trigger.click().await,
            Err(e) => Err(e),
        };
        if let Err(e) = opened {
            record_issue(
                &mut record.issues,
                DatasetError::interaction(&dataset, GateState::FormPresent, e),
            );
            staging.remove();
            return;
        }

        let run = self
            .gate
            .run(
                &*session,
                recognizer,
                &dataset,
                &record.folder,
                staging.path(),
            )
            .await;
        staging.remove();

        record.issues.extend(run.issues);
        if let Some(error) = run.outcome.error() {
            record.issues.push(DatasetIssue::from_error(error));
        }
        record.gate = Some(run.outcome);
    }
}

/// Sanitized folder name, kept clear of the staging root that is deleted at
/// the end of a run.
fn folder_name(display_name: &str) -> String {
    let name = sanitize_dataset_name(display_name);
    if name.eq_ignore_ascii_case(STAGING_DIR_NAME) {
        let renamed = format!("{name}{RESERVED_NAME_SUFFIX}");
        warn!(
            dataset = display_name,
            folder = %renamed,
            "dataset name is reserved, renaming folder"
        );
        return renamed;
    }
    name
}

fn record_issue(issues: &mut Vec<DatasetIssue>, error: DatasetError) {
    warn!(error = %error, category = %error.category(), "dataset issue");
    issues.push(DatasetIssue::from_error(&error));
}

//! Run orchestration: paging, per-dataset processing, cleanup, archive, report.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::{ArchiveError, archive};
use crate::config::HarvestSettings;
use crate::dataset::{DatasetProcessor, DatasetReference};
use crate::discover::{DiscoveryError, LinkDiscoverer};
use crate::recognizer::TextRecognizer;
use crate::report::{DatasetSummary, ReportError, RunSummary, write_report};
use crate::session::PageSession;
use crate::wait::{RetryDecision, RetryPolicy};

/// Failures that end a run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("invalid harvest settings: {0}")]
    InvalidSettings(String),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Live counters for progress display.
#[derive(Debug, Default)]
pub struct RunProgress {
    total: AtomicUsize,
    processed: AtomicUsize,
    failed: AtomicUsize,
    current: Mutex<Option<String>>,
}

impl RunProgress {
    /// Datasets queued for processing; zero while still paging.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// URL of the dataset being processed, if any.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    fn set_current(&self, value: Option<String>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = value;
        }
    }
}

/// References gathered across listing pages.
#[derive(Debug, Default)]
struct Collected {
    references: Vec<DatasetReference>,
    pages_visited: u32,
    pages_failed: u32,
    stopped_early: bool,
    duplicates_skipped: usize,
}

/// Runs one complete harvest against a single page session.
pub struct Harvester {
    settings: HarvestSettings,
    recognizer: Arc<dyn TextRecognizer>,
    discoverer: LinkDiscoverer,
    processor: DatasetProcessor,
    retry: RetryPolicy,
    progress: Arc<RunProgress>,
}

impl Harvester {
    #[must_use]
    pub fn new(settings: HarvestSettings, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let discoverer = LinkDiscoverer::new(
            settings.base_url.clone(),
            settings.layout.listing_link.clone(),
            settings.waits,
        );
        let processor = DatasetProcessor::new(&settings);
        let retry = RetryPolicy::with_max_attempts(settings.page_retry_attempts);
        Self {
            settings,
            recognizer,
            discoverer,
            processor,
            retry,
            progress: Arc::new(RunProgress::default()),
        }
    }

    /// Replaces the listing-page retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Pages, processes, cleans up, and archives. The session is closed
    /// before archiving whether or not datasets succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] for invalid settings, an unusable output
    /// directory, or a failed archive or report. Per-dataset and per-page
    /// failures never end the run.
    #[instrument(skip(self, session), fields(base_url = %self.settings.base_url))]
    pub async fn run(&self, mut session: Box<dyn PageSession>) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();

        if let Err(reason) = self.settings.validate() {
            close_session(session).await;
            return Err(HarvestError::InvalidSettings(reason));
        }
        if let Err(e) = self.prepare_dirs() {
            close_session(session).await;
            return Err(e);
        }

        let collected = self.collect_references(session.as_mut()).await;
        info!(
            links = collected.references.len(),
            pages = collected.pages_visited,
            "link discovery finished"
        );

        let datasets = self
            .process_all(session.as_mut(), &collected.references)
            .await;

        close_session(session).await;
        self.remove_staging_root();

        let bundle = archive(&self.settings.output_dir)?;

        let summary = RunSummary {
            base_url: self.settings.base_url.to_string(),
            first_page: self.settings.first_page,
            last_page: self.settings.last_page,
            pages_visited: collected.pages_visited,
            pages_failed: collected.pages_failed,
            stopped_early: collected.stopped_early,
            links_discovered: collected.references.len() + collected.duplicates_skipped,
            duplicates_skipped: collected.duplicates_skipped,
            datasets,
            bundle: Some(bundle),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if self.settings.write_report {
            write_report(&summary, &self.settings.report_path())?;
        }

        info!(
            completed = summary.completed(),
            partial = summary.partial(),
            failed = summary.failed(),
            "harvest finished"
        );
        Ok(summary)
    }

    fn prepare_dirs(&self) -> Result<(), HarvestError> {
        for dir in [self.settings.output_dir.clone(), self.settings.staging_root()] {
            fs::create_dir_all(&dir).map_err(|source| HarvestError::Io { path: dir, source })?;
        }
        Ok(())
    }

    async fn collect_references(&self, session: &mut dyn PageSession) -> Collected {
        let mut collected = Collected::default();
        let mut seen = HashSet::new();
        let mut consecutive_failures = 0u32;

        for page in self.settings.first_page..=self.settings.last_page {
            collected.pages_visited += 1;
            match self.discover_with_retry(session, page).await {
                Ok(references) => {
                    consecutive_failures = 0;
                    if references.is_empty() {
                        info!(page, "listing page has no datasets");
                        if self.settings.stop_on_empty_page {
                            collected.stopped_early = page < self.settings.last_page;
                            break;
                        }
                        continue;
                    }
                    for reference in references {
                        if self.settings.dedupe_links && !seen.insert(reference.clone()) {
                            debug!(url = %reference, "skipping duplicate link");
                            collected.duplicates_skipped += 1;
                            continue;
                        }
                        collected.references.push(reference);
                    }
                }
                Err(e) => {
                    collected.pages_failed += 1;
                    consecutive_failures += 1;
                    error!(page, error = %e, "listing page failed");
                    if consecutive_failures >= self.settings.max_consecutive_page_failures {
                        warn!(
                            page,
                            consecutive_failures, "too many failed listing pages, stopping paging"
                        );
                        collected.stopped_early = page < self.settings.last_page;
                        break;
                    }
                }
            }
        }
        collected
    }

    async fn discover_with_retry(
        &self,
        session: &mut dyn PageSession,
        page: u32,
    ) -> Result<Vec<DatasetReference>, DiscoveryError> {
        let mut attempt = 1;
        loop {
            match self.discoverer.discover(session, page).await {
                Ok(references) => return Ok(references),
                Err(e) => match self.retry.should_retry(e.failure_type(), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next,
                    } => {
                        warn!(page, attempt, error = %e, ?delay, "retrying listing page");
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(page, reason = %reason, "not retrying listing page");
                        return Err(e);
                    }
                },
            }
        }
    }

    async fn process_all(
        &self,
        session: &mut dyn PageSession,
        references: &[DatasetReference],
    ) -> Vec<DatasetSummary> {
        self.progress.total.store(references.len(), Ordering::SeqCst);
        let mut summaries = Vec::with_capacity(references.len());

        for (index, reference) in references.iter().enumerate() {
            self.progress.set_current(Some(reference.to_string()));
            debug!(index = index + 1, total = references.len(), url = %reference, "processing dataset");

            let summary = match self
                .processor
                .process(session, self.recognizer.as_ref(), reference)
                .await
            {
                Ok(record) => DatasetSummary::from_record(&record),
                Err(e) => {
                    error!(url = %reference, category = %e.category(), error = %e, "dataset failed");
                    self.progress.failed.fetch_add(1, Ordering::SeqCst);
                    DatasetSummary::failed(reference, &e)
                }
            };
            summaries.push(summary);
            self.progress.processed.fetch_add(1, Ordering::SeqCst);
        }

        self.progress.set_current(None);
        summaries
    }

    fn remove_staging_root(&self) {
        let staging = self.settings.staging_root();
        match fs::remove_dir_all(&staging) {
            Ok(()) => debug!(dir = %staging.display(), "staging removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %staging.display(), error = %e, "failed to remove staging"),
        }
    }
}

async fn close_session(session: Box<dyn PageSession>) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "failed to close browser session");
    }
}

//! The download gate state machine.
//!
//! `FormPresent → FormFilled → CaptchaCaptured → CaptchaSolved → Submitted →
//! ArtifactRelocated`, or `Aborted` from any state. Every failure is converted
//! into [`GateOutcome::Aborted`]; nothing escapes [`DownloadGate::run`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::staging::{RelocatedArtifact, relocate_all, wait_for_download};
use super::state::GateState;
use crate::config::{PortalLayout, RequesterIdentity, WaitSettings};
use crate::dataset::{DatasetError, DatasetIssue};
use crate::recognizer::TextRecognizer;
use crate::session::{PageElement, PageSession, RenderError, require, wait_for};

/// Name of the CAPTCHA snapshot inside the dataset folder.
pub const CAPTCHA_FILE_NAME: &str = "captcha.png";

/// How the gate ended for one dataset.
#[derive(Debug)]
pub enum GateOutcome {
    /// Downloaded files now live in the dataset folder.
    Relocated {
        artifacts: Vec<RelocatedArtifact>,
        /// Trimmed recognizer output submitted on the successful attempt.
        captcha_text: String,
        /// Decode+submit cycles used.
        attempts: u32,
    },
    /// The gate stopped early.
    Aborted {
        /// State the workflow was in when it failed.
        last_state: GateState,
        error: DatasetError,
    },
}

impl GateOutcome {
    #[must_use]
    pub fn is_relocated(&self) -> bool {
        matches!(self, Self::Relocated { .. })
    }

    /// The terminal state: [`GateState::ArtifactRelocated`] or the state that failed.
    #[must_use]
    pub fn state(&self) -> GateState {
        match self {
            Self::Relocated { .. } => GateState::ArtifactRelocated,
            Self::Aborted { last_state, .. } => *last_state,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&DatasetError> {
        match self {
            Self::Relocated { .. } => None,
            Self::Aborted { error, .. } => Some(error),
        }
    }
}

/// Outcome plus the non-fatal issues noticed on the way.
#[derive(Debug)]
pub struct GateRun {
    pub outcome: GateOutcome,
    pub issues: Vec<DatasetIssue>,
}

/// Per-dataset inputs for one gate run.
struct Target<'a> {
    dataset: &'a str,
    folder: &'a Path,
    staging: &'a Path,
}

/// Drives the request form for one dataset at a time.
#[derive(Debug, Clone)]
pub struct DownloadGate {
    layout: PortalLayout,
    requester: RequesterIdentity,
    waits: WaitSettings,
    captcha_attempts: u32,
}

impl DownloadGate {
    #[must_use]
    pub fn new(
        layout: PortalLayout,
        requester: RequesterIdentity,
        waits: WaitSettings,
        captcha_attempts: u32,
    ) -> Self {
        Self {
            layout,
            requester,
            waits,
            captcha_attempts: captcha_attempts.max(1),
        }
    }

    /// Runs the gate after the download trigger was clicked.
    ///
    /// Downloads are expected in `staging`, which must be private to this
    /// dataset. Relocated files and `captcha.png` land in `folder`.
    #[instrument(skip(self, session, recognizer, folder, staging))]
    pub async fn run(
        &self,
        session: &dyn PageSession,
        recognizer: &dyn TextRecognizer,
        dataset: &str,
        folder: &Path,
        staging: &Path,
    ) -> GateRun {
        let target = Target {
            dataset,
            folder,
            staging,
        };
        let mut state = GateState::FormPresent;
        let mut issues = Vec::new();

        let outcome = match self
            .drive(session, recognizer, &target, &mut state, &mut issues)
            .await
        {
            Ok((artifacts, captcha_text, attempts)) => {
                info!(
                    dataset,
                    files = artifacts.len(),
                    attempts,
                    "download relocated"
                );
                GateOutcome::Relocated {
                    artifacts,
                    captcha_text,
                    attempts,
                }
            }
            Err(error) => {
                if matches!(error, DatasetError::FormTimeout { .. }) {
                    info!(dataset, "no request form; dataset has no gated download");
                } else {
                    warn!(dataset, state = %state, error = %error, "download gate aborted");
                }
                GateOutcome::Aborted {
                    last_state: state,
                    error,
                }
            }
        };

        GateRun { outcome, issues }
    }

    async fn drive(
        &self,
        session: &dyn PageSession,
        recognizer: &dyn TextRecognizer,
        target: &Target<'_>,
        state: &mut GateState,
        issues: &mut Vec<DatasetIssue>,
    ) -> Result<(Vec<RelocatedArtifact>, String, u32), DatasetError> {
        let dataset = target.dataset;
        let layout = &self.layout;

        *state = GateState::FormPresent;
        let name_field = wait_for(session, &layout.name_field, &self.waits.form_policy())
            .await
            .map_err(interaction(dataset, *state))?
            .ok_or_else(|| DatasetError::form_timeout(dataset, self.waits.form_wait))?;

        *state = GateState::FormFilled;
        self.fill_form(session, &*name_field, dataset).await?;

        let mut attempt = 1;
        loop {
            *state = GateState::CaptchaCaptured;
            let image = self.capture_captcha(session, target).await?;

            *state = GateState::CaptchaSolved;
            let text = self
                .solve_captcha(session, recognizer, &image, attempt, target, issues)
                .await?;

            *state = GateState::Submitted;
            require(session, &layout.submit)
                .await
                .map_err(interaction(dataset, *state))?
                .click()
                .await
                .map_err(interaction(dataset, *state))?;
            debug!(dataset, attempt, "request form submitted");

            let settled = wait_for_download(target.staging, &self.waits.download_policy())
                .await
                .map_err(|e| DatasetError::relocation(target.staging, e))?;

            if settled.is_some() {
                *state = GateState::ArtifactRelocated;
                let artifacts = relocate_all(target.staging, target.folder)?;
                return Ok((artifacts, text, attempt));
            }

            let no_artifact = DatasetError::no_artifact(dataset, self.waits.download_timeout);
            if attempt >= self.captcha_attempts || !self.captcha_rejected(session).await {
                return Err(no_artifact);
            }
            warn!(dataset, attempt, "captcha apparently rejected, retrying");
            issues.push(DatasetIssue::from_error(&no_artifact));
            attempt += 1;
        }
    }

    async fn fill_form(
        &self,
        session: &dyn PageSession,
        name_field: &dyn PageElement,
        dataset: &str,
    ) -> Result<(), DatasetError> {
        let layout = &self.layout;
        let at = || interaction(dataset, GateState::FormFilled);

        name_field
            .send_keys(&self.requester.name)
            .await
            .map_err(at())?;
        require(session, &layout.email_field)
            .await
            .map_err(at())?
            .send_keys(&self.requester.email)
            .await
            .map_err(at())?;
        require(session, &layout.purpose_field)
            .await
            .map_err(at())?
            .send_keys(&self.requester.purpose)
            .await
            .map_err(at())?;

        // A missing usage option is tolerated; the form may not ask for it.
        let radios = session.find_all(&layout.usage_radio).await.map_err(at())?;
        for radio in radios {
            let value = radio.attribute("value").await.map_err(at())?;
            if value.as_deref() == Some(self.requester.usage_type.as_str()) {
                radio.click().await.map_err(at())?;
                return Ok(());
            }
        }
        debug!(dataset, usage_type = %self.requester.usage_type, "usage option not offered");
        Ok(())
    }

    async fn capture_captcha(
        &self,
        session: &dyn PageSession,
        target: &Target<'_>,
    ) -> Result<Vec<u8>, DatasetError> {
        let at = || interaction(target.dataset, GateState::CaptchaCaptured);
        let image = require(session, &self.layout.captcha_image)
            .await
            .map_err(at())?
            .screenshot_png()
            .await
            .map_err(at())?;

        let path: PathBuf = target.folder.join(CAPTCHA_FILE_NAME);
        fs::write(&path, &image).map_err(|e| DatasetError::filesystem(&path, e))?;
        Ok(image)
    }

    async fn solve_captcha(
        &self,
        session: &dyn PageSession,
        recognizer: &dyn TextRecognizer,
        image: &[u8],
        attempt: u32,
        target: &Target<'_>,
        issues: &mut Vec<DatasetIssue>,
    ) -> Result<String, DatasetError> {
        let dataset = target.dataset;
        let at = || interaction(dataset, GateState::CaptchaSolved);

        let raw = recognizer
            .recognize(image)
            .await
            .map_err(|e| DatasetError::captcha_decode(dataset, e))?;
        let text = raw.trim().to_string();
        if text.is_empty() {
            let issue = DatasetError::captcha_decode(dataset, "recognizer returned no text");
            warn!(dataset, attempt, "empty captcha decode, submitting anyway");
            issues.push(DatasetIssue::from_error(&issue));
        }

        let input = require(session, &self.layout.captcha_input)
            .await
            .map_err(at())?;
        if attempt > 1 {
            input.clear().await.map_err(at())?;
        }
        input.send_keys(&text).await.map_err(at())?;
        Ok(text)
    }

    /// After a submit produced nothing, a CAPTCHA input still on the page means
    /// the form was re-shown rather than accepted.
    async fn captcha_rejected(&self, session: &dyn PageSession) -> bool {
        matches!(session.find(&self.layout.captcha_input).await, Ok(Some(_)))
    }
}

fn interaction(
    dataset: &str,
    state: GateState,
) -> impl FnOnce(RenderError) -> DatasetError + '_ {
    move |source| DatasetError::interaction(dataset, state, source)
}

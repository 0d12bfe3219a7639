//! CAPTCHA text recognition.
//!
//! [`TesseractRecognizer`] pipes the PNG into the `tesseract` CLI
//! (`tesseract stdin stdout`) and returns whatever text it produced. Accuracy is
//! best-effort; callers decide what to do with an empty guess.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Environment variable overriding the tesseract binary location.
pub const TESSERACT_PATH_ENV: &str = "HARVESTER_TESSERACT_PATH";

/// Page segmentation mode: treat the image as a single text line.
const SINGLE_LINE_PSM: &str = "7";

/// Errors produced while decoding an image.
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// No usable recognizer binary.
    #[error("tesseract not found; install it or set {TESSERACT_PATH_ENV} / --tesseract-path")]
    NotInstalled,

    /// The recognizer process could not be run.
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The recognizer ran but reported failure.
    #[error("{binary} exited with {status}: {stderr}")]
    Failed {
        binary: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Turns an image into best-effort text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Decodes `image_png`. The result is raw; callers trim it.
    async fn recognize(&self, image_png: &[u8]) -> Result<String, RecognizeError>;
}

/// Find the tesseract binary.
///
/// Order: explicit path, `HARVESTER_TESSERACT_PATH`, then `PATH`.
#[must_use]
pub fn find_tesseract(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(TESSERACT_PATH_ENV).map(PathBuf::from)
        && path.exists()
    {
        return Some(path);
    }
    which::which("tesseract").ok()
}

/// [`TextRecognizer`] backed by the tesseract command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
}

impl TesseractRecognizer {
    /// Uses the given binary as-is.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Locates tesseract via [`find_tesseract`].
    ///
    /// # Errors
    ///
    /// Returns [`RecognizeError::NotInstalled`] when no binary is found.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, RecognizeError> {
        find_tesseract(explicit)
            .map(Self::new)
            .ok_or(RecognizeError::NotInstalled)
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    #[instrument(level = "debug", skip(self, image_png), fields(bytes = image_png.len()))]
    async fn recognize(&self, image_png: &[u8]) -> Result<String, RecognizeError> {
        let spawn_error = |source| RecognizeError::Spawn {
            binary: self.binary.clone(),
            source,
        };

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--psm", SINGLE_LINE_PSM])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        // The pipe drops after the write, so tesseract sees EOF.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(image_png).await,
            None => Ok(()),
        };

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if !output.status.success() {
            return Err(RecognizeError::Failed {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(spawn_error)?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.trim().len(), "recognizer finished");
        Ok(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_missing_explicit_path_is_not_installed() {
        let result = TesseractRecognizer::locate(Some(Path::new("/no/such/tesseract")));
        assert!(matches!(result, Err(RecognizeError::NotInstalled)));
    }

    #[tokio::test]
    async fn test_recognize_missing_binary_is_spawn_error() {
        let recognizer = TesseractRecognizer::new("/no/such/tesseract");
        let error = recognizer.recognize(b"png").await.unwrap_err();
        assert!(matches!(error, RecognizeError::Spawn { .. }));
        assert!(error.to_string().contains("/no/such/tesseract"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognize_nonzero_exit_is_failed() {
        // `false` ignores its arguments and exits 1.
        let Some(binary) = which::which("false").ok() else {
            return;
        };
        let recognizer = TesseractRecognizer::new(binary);
        let error = recognizer.recognize(b"png").await.unwrap_err();
        assert!(matches!(error, RecognizeError::Failed { .. }), "{error:?}");
    }
}

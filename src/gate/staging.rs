//! Private staging directories and artifact relocation.
//!
//! Each dataset gets its own staging directory, so everything found there after
//! a submit belongs to that dataset. Browsers write in-flight downloads under a
//! temporary name (`.crdownload`, `.part`, `.tmp`); a download counts as
//! finished once no such file remains and sizes stop changing between polls.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::dataset::DatasetError;
use crate::wait::{PollPolicy, poll_until};

/// Extensions browsers use for downloads still in flight.
const PARTIAL_EXTENSIONS: &[&str] = &["crdownload", "part", "tmp"];

/// A downloaded file after relocation into its dataset folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocatedArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
}

/// A staging directory owned by one dataset for the duration of its gate.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Creates `dir` empty. Leftovers from an earlier run are discarded so
    /// they can't be claimed by this dataset.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory can't be cleared or created.
    pub fn prepare(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Deletes the directory and anything left in it. Failures are logged.
    pub fn remove(self) {
        if let Err(e) = fs::remove_dir_all(&self.dir)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(dir = %self.dir.display(), error = %e, "failed to remove staging directory");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedFile {
    path: PathBuf,
    len: u64,
}

/// Regular files directly inside `dir`, sorted by path.
fn snapshot(dir: &Path) -> io::Result<Vec<StagedFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            files.push(StagedFile {
                path: entry.path(),
                len: metadata.len(),
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PARTIAL_EXTENSIONS
                .iter()
                .any(|partial| ext.eq_ignore_ascii_case(partial))
        })
}

/// Polls `dir` until a finished download is present.
///
/// Returns the file paths once at least one file exists, none is partial,
/// and the listing (names and sizes) matched the previous poll. `Ok(None)`
/// means nothing settled within the policy's timeout.
///
/// # Errors
///
/// Returns the I/O error if the directory can't be read.
pub async fn wait_for_download(
    dir: &Path,
    policy: &PollPolicy,
) -> io::Result<Option<Vec<PathBuf>>> {
    let previous: Mutex<Option<Vec<StagedFile>>> = Mutex::new(None);
    let previous = &previous;
    poll_until(policy, || async move { settled_files(dir, previous) }).await
}

fn settled_files(
    dir: &Path,
    previous: &Mutex<Option<Vec<StagedFile>>>,
) -> io::Result<Option<Vec<PathBuf>>> {
    let current = snapshot(dir)?;
    if current.is_empty() || current.iter().any(|file| is_partial(&file.path)) {
        return Ok(None);
    }

    let mut last = previous
        .lock()
        .map_err(|_| io::Error::other("staging poll state poisoned"))?;
    if last.as_ref() == Some(&current) {
        let bytes: u64 = current.iter().map(|file| file.len).sum();
        debug!(files = current.len(), bytes, "download settled");
        return Ok(Some(current.into_iter().map(|file| file.path).collect()));
    }
    *last = Some(current);
    Ok(None)
}

/// Moves every regular file currently in `staging` into `folder`.
///
/// Files keep their names and replace same-named files already in `folder`.
/// Only files present when this is called are moved.
///
/// # Errors
///
/// Returns [`DatasetError::Relocation`] if staging can't be read or a file
/// can't be moved.
pub fn relocate_all(
    staging: &Path,
    folder: &Path,
) -> Result<Vec<RelocatedArtifact>, DatasetError> {
    let files = snapshot(staging).map_err(|e| DatasetError::relocation(staging, e))?;
    relocate_files(files, folder)
}

/// Moves the files of one snapshot; anything staged after it stays put.
fn relocate_files(
    files: Vec<StagedFile>,
    folder: &Path,
) -> Result<Vec<RelocatedArtifact>, DatasetError> {
    let mut artifacts = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.path.file_name() else {
            continue;
        };
        let target = folder.join(name);
        move_file(&file.path, &target).map_err(|e| DatasetError::relocation(&file.path, e))?;

        let (bytes, sha256) =
            digest_file(&target).map_err(|e| DatasetError::relocation(&target, e))?;
        debug!(path = %target.display(), bytes, "artifact relocated");
        artifacts.push(RelocatedArtifact {
            path: target,
            bytes,
            sha256,
        });
    }
    Ok(artifacts)
}

/// `rename`, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_error) => {
            debug!(error = %rename_error, "rename failed, copying instead");
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

fn digest_file(path: &Path) -> io::Result<(u64, String)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut file, &mut hasher)?;
    Ok((bytes, format!("{:x}", hasher.finalize())))
}

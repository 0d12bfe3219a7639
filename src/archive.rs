//! Bundles the output tree into `{output_root}.zip`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::result::ZipError;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::config::sibling_with_suffix;

/// Errors raised while writing the bundle.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The output tree could not be walked.
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
}

impl ArchiveError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn zip(path: impl Into<PathBuf>, source: ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }
}

/// Writes every regular file under `output_root` into `{output_root}.zip`.
///
/// Entry names are `/`-separated paths relative to the root, added in sorted
/// order. Any earlier bundle is replaced once the new one is complete.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the tree can't be read or the bundle written.
#[instrument(skip(output_root), fields(root = %output_root.display()))]
pub fn archive(output_root: &Path) -> Result<PathBuf, ArchiveError> {
    let bundle = sibling_with_suffix(output_root, ".zip");
    let partial = sibling_with_suffix(output_root, ".zip.part");

    let entries = match write_bundle(output_root, &partial, &bundle) {
        Ok(entries) => entries,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial)
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                debug!(
                    path = %partial.display(),
                    error = %cleanup,
                    "failed to remove partial bundle"
                );
            }
            return Err(e);
        }
    };
    fs::rename(&partial, &bundle).map_err(|e| ArchiveError::io(&bundle, e))?;

    info!(bundle = %bundle.display(), entries, "archive written");
    Ok(bundle)
}

fn write_bundle(root: &Path, partial: &Path, bundle: &Path) -> Result<usize, ArchiveError> {
    let file = File::create(partial).map_err(|e| ArchiveError::io(partial, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0usize;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path == partial || path == bundle {
            continue;
        }
        let Some(name) = entry_name(root, path) else {
            continue;
        };

        writer
            .start_file(name.as_str(), options)
            .map_err(|e| ArchiveError::zip(partial, e))?;
        let mut source = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
        io::copy(&mut source, &mut writer).map_err(|e| ArchiveError::io(partial, e))?;
        debug!(entry = %name, "archived");
        entries += 1;
    }

    writer.finish().map_err(|e| ArchiveError::zip(partial, e))?;
    Ok(entries)
}

fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

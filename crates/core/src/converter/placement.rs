//! Moving finished outputs from a converter's scratch directory to their destination.
//!
//! Tools write into a private temporary directory. Only complete files are moved
//! into the destination, each with a single rename.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use super::error::ConverterError;

/// Attempts to move a file atomically (rename).
async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(true),
        Err(e) => {
            // Cross-filesystem moves fail with EXDEV (18 on Linux)
            if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                Ok(false)
            } else {
                Err(e)
            }
        }
    }
}

/// Moves `source` to `destination`, creating the destination's parent directory.
///
/// Across filesystems the file is copied next to the destination under a hidden
/// name and renamed into place, so the destination never holds a partial file.
pub async fn place_file(source: &Path, destination: &Path) -> Result<PathBuf, ConverterError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }

    if !try_atomic_move(source, destination).await? {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = destination.with_file_name(format!(".{}.partial", name));
        if let Err(e) = fs::copy(source, &staging).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        fs::rename(&staging, destination).await?;
        fs::remove_file(source).await?;
    }

    debug!(from = %source.display(), to = %destination.display(), "Placed output");
    Ok(destination.to_path_buf())
}

/// Moves every regular file in `temp_dir` into `destination_dir`, in name order.
///
/// If any move fails, files already moved are removed again.
pub async fn place_all(
    temp_dir: &Path,
    destination_dir: &Path,
) -> Result<Vec<PathBuf>, ConverterError> {
    let files = list_files(temp_dir).await?;
    let mut placed = Vec::with_capacity(files.len());

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        match place_file(&file, &destination_dir.join(name)).await {
            Ok(path) => placed.push(path),
            Err(e) => {
                remove_outputs(&placed).await;
                return Err(e);
            }
        }
    }

    Ok(placed)
}

/// Regular files directly inside `dir`, sorted by name.
pub async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ConverterError> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Best-effort removal of outputs from a failed conversion.
pub async fn remove_outputs(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
        }
    }
}

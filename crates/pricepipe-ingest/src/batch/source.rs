//! Input file enumeration
//!
//! Explicit file names win over directory listing. Names are resolved against
//! the intake directory unless they are already absolute.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};

/// Ordered list of files to process in one run
pub async fn enumerate_files(
    intake_dir: &Path,
    explicit: Option<&[String]>,
) -> IngestResult<Vec<PathBuf>> {
    match explicit {
        Some(names) if !names.is_empty() => Ok(resolve_explicit(intake_dir, names).await),
        _ => list_intake_dir(intake_dir).await,
    }
}

async fn resolve_explicit(intake_dir: &Path, names: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::with_capacity(names.len());

    for name in names {
        let path = intake_dir.join(name);
        if is_file(&path).await {
            files.push(path);
        } else {
            warn!(file = %path.display(), "Requested batch file does not exist, skipping");
        }
    }

    files
}

/// Regular files in `intake_dir`, sorted by name
async fn list_intake_dir(intake_dir: &Path) -> IngestResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(intake_dir).await.map_err(|e| {
        IngestError::Source(format!("cannot list '{}': {}", intake_dir.display(), e))
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| IngestError::Source(format!("cannot list '{}': {}", intake_dir.display(), e)))?
    {
        let path = entry.path();
        if is_file(&path).await {
            files.push(path);
        } else {
            debug!(entry = %path.display(), "Ignoring non-file entry");
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

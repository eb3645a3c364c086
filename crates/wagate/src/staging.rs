//! Attachment staging for file-based media sends.
//!
//! The messaging session can only attach media from a path on disk, so decoded
//! documents are written to a staging directory right before a send and removed
//! right after. On-disk names are generated internally with a ULID so two
//! requests using the same caller filename never race on one path; the caller's
//! filename survives as the document's display name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Errors raised while writing or removing a staged file.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to prepare staging directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write staged file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove staged file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes attachments into a dedicated directory.
#[derive(Debug, Clone)]
pub struct AttachmentStager {
    dir: PathBuf,
}

impl AttachmentStager {
    /// Create the stager, making sure the directory exists.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StagingError::Directory {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    #[cfg(test)]
    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` to a fresh file and hand back its owning guard.
    ///
    /// `display_name` is what the recipient sees; it never touches the path.
    pub async fn stage(
        &self,
        data: &[u8],
        display_name: &str,
    ) -> Result<StagedAttachment, StagingError> {
        let path = self.dir.join(format!("{}.pdf", ulid::Ulid::new()));

        let write = async {
            let mut file = fs::File::create(&path).await?;
            file.write_all(data).await?;
            file.sync_all().await
        };
        if let Err(source) = write.await {
            // Partial writes must not outlive the failed request
            let _ = fs::remove_file(&path).await;
            return Err(StagingError::Write { path, source });
        }

        debug!(path = %path.display(), bytes = data.len(), "Staged attachment");

        Ok(StagedAttachment {
            path: Some(path),
            display_name: display_name.to_string(),
        })
    }
}

/// A staged file owned by one request.
///
/// Call [`StagedAttachment::unstage`] once the send resolves. If the guard is
/// dropped without that (early return, panic), the file is removed
/// synchronously in `Drop`.
#[derive(Debug)]
pub struct StagedAttachment {
    path: Option<PathBuf>,
    display_name: String,
}

impl StagedAttachment {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Delete the staged file. A file that is already gone counts as removed.
    pub async fn unstage(mut self) -> Result<(), StagingError> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Unstaged attachment");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StagingError::Remove { path, source }),
        }
    }
}

impl Drop for StagedAttachment {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "Failed to remove orphaned attachment");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

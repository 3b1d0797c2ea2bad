//! Durable storage for result artifacts and spooled uploads.
//!
//! A flat directory of markdown files addressable by filename, plus an
//! `uploads/` subdirectory holding the spooled source PDFs. Result writes
//! are atomic (temp file + rename) so a concurrent `read` never observes
//! a half-written artifact. Filenames are validated against path
//! separators and traversal components before touching the filesystem.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::WorkbenchError;

/// Directory-backed artifact store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (and create if needed) the store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, WorkbenchError> {
        let root = root.into();
        let uploads = root.join("uploads");
        tokio::fs::create_dir_all(&uploads)
            .await
            .map_err(|e| WorkbenchError::Storage {
                path: uploads,
                source: e,
            })?;
        Ok(Self { root })
    }

    /// Directory this store writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a result artifact atomically: write to `<name>.tmp`, then
    /// rename over the final path.
    pub async fn write(&self, name: &str, content: &str) -> Result<(), WorkbenchError> {
        validate_name(name)?;
        let path = self.root.join(name);
        let tmp_path = self.root.join(format!("{name}.tmp"));

        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| WorkbenchError::Storage {
                path: tmp_path.clone(),
                source: e,
            })?;

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| WorkbenchError::Storage {
                path: path.clone(),
                source: e,
            })?;

        debug!(artifact = name, bytes = content.len(), "artifact stored");
        Ok(())
    }

    /// Read a result artifact back as UTF-8 text.
    pub async fn read(&self, name: &str) -> Result<String, WorkbenchError> {
        validate_name(name)?;
        let path = self.root.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WorkbenchError::ArtifactNotFound {
                    filename: name.to_string(),
                })
            }
            Err(e) => Err(WorkbenchError::Storage { path, source: e }),
        }
    }

    /// Spool uploaded PDF bytes for later page rendering.
    ///
    /// Returns the path the dispatcher should render from.
    pub(crate) async fn spool_upload(
        &self,
        doc_id: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, WorkbenchError> {
        let path = self.root.join("uploads").join(format!("{doc_id}.pdf"));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| WorkbenchError::Storage {
                path: path.clone(),
                source: e,
            })?;
        Ok(path)
    }

    /// Remove a spooled upload whose document never got registered.
    pub(crate) async fn discard_upload(&self, path: &Path) {
        let _ = tokio::fs::remove_file(path).await;
    }
}

/// Reject names that would escape the artifact directory.
fn validate_name(name: &str) -> Result<(), WorkbenchError> {
    let bad = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.');
    if bad {
        return Err(WorkbenchError::InvalidArtifactName {
            filename: name.to_string(),
        });
    }
    Ok(())
}

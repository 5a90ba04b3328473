//! Filesystem-backed [`DocumentSource`].
//!
//! Layout: one directory per document id under the root, holding exactly
//! one file with the document's original name:
//!
//! ```text
//! <root>/<document_id>/<file_name>
//! ```
//!
//! The MIME type is inferred from the file extension.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docingest_core::models::SourceDocument;
use docingest_core::source::{DocumentSource, SourceError};
use tracing::debug;
use walkdir::WalkDir;

use crate::extract::mime_for_path;

const UNKNOWN_MIME: &str = "application/octet-stream";

pub struct FsDocumentSource {
    root: PathBuf,
    max_file_bytes: u64,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a document id; `None` for ids that would escape the root.
    fn document_dir(&self, document_id: &str) -> Option<PathBuf> {
        if !is_safe_component(document_id) {
            return None;
        }
        Some(self.root.join(document_id))
    }
}

/// A single, non-empty path component that is neither `.` nor `..`.
fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Prefix of the temporary file an upload is written to before it is
/// renamed into place.
const STAGING_PREFIX: &str = ".upload-";

/// Regular files in `dir` by name, excluding in-flight uploads.
fn stored_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
        .map(|e| e.into_path())
        .collect()
}

fn stored_file(dir: &Path) -> Option<PathBuf> {
    stored_files(dir).into_iter().next()
}

fn io_unavailable(path: &Path, err: std::io::Error) -> SourceError {
    SourceError::Unavailable(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn get(&self, document_id: &str) -> Result<SourceDocument, SourceError> {
        let not_found = || SourceError::NotFound(document_id.to_string());
        let dir = self.document_dir(document_id).ok_or_else(not_found)?;
        if !dir.is_dir() {
            return Err(not_found());
        }
        let path = stored_file(&dir).ok_or_else(not_found)?;

        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_unavailable(&path, e))?
            .len();
        if size > self.max_file_bytes {
            return Err(SourceError::TooLarge {
                document_id: document_id.to_string(),
                size,
                limit: self.max_file_bytes,
            });
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| io_unavailable(&path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = mime_for_path(&path).unwrap_or(UNKNOWN_MIME).to_string();
        debug!(document_id, %file_name, bytes = bytes.len(), "document read");

        Ok(SourceDocument {
            file_name,
            mime_type,
            bytes,
        })
    }

    async fn put(
        &self,
        document_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, SourceError> {
        let dir = self
            .document_dir(document_id)
            .ok_or_else(|| SourceError::Unavailable(format!("invalid document id: {}", document_id)))?;
        if !is_safe_component(file_name) || file_name.starts_with(STAGING_PREFIX) {
            return Err(SourceError::Unavailable(format!(
                "invalid file name: {}",
                file_name
            )));
        }
        if bytes.len() as u64 > self.max_file_bytes {
            return Err(SourceError::TooLarge {
                document_id: document_id.to_string(),
                size: bytes.len() as u64,
                limit: self.max_file_bytes,
            });
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_unavailable(&dir, e))?;
        // The previous upload stays readable until the new one is in place.
        let path = dir.join(file_name);
        let staging = dir.join(format!("{}{}", STAGING_PREFIX, file_name));
        if let Err(e) = tokio::fs::write(&staging, bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_unavailable(&staging, e));
        }
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| io_unavailable(&path, e))?;

        // One file per document.
        for previous in stored_files(&dir).into_iter().filter(|p| *p != path) {
            tokio::fs::remove_file(&previous)
                .await
                .map_err(|e| io_unavailable(&previous, e))?;
        }
        Ok(path.display().to_string())
    }

    async fn list(&self) -> Result<Vec<String>, SourceError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry =
                entry.map_err(|e| SourceError::Unavailable(format!("{}: {}", self.root.display(), e)))?;
            if entry.file_type().is_dir() && stored_file(entry.path()).is_some() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(ids)
    }
}

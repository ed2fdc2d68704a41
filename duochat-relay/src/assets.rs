//! Disk-backed storage for uploaded images.
//!
//! Uploads land under a configured directory with a generated name; the
//! returned URL path is what clients embed in image messages. Only a
//! harmless file extension survives from the original filename.

use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("uploaded file is empty")]
    Empty,
    #[error("upload too large ({size} bytes, max {max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("storage error: {0}")]
    Io(String),
}

/// Writes uploaded files to disk and hands back their serving path.
#[derive(Debug)]
pub struct AssetStore {
    dir: PathBuf,
    max_size: usize,
}

impl AssetStore {
    #[must_use]
    pub const fn new(dir: PathBuf, max_size: usize) -> Self {
        Self { dir, max_size }
    }

    /// Directory the files are served from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Largest accepted upload, in bytes.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Persists `data` and returns its URL path under `/uploads`.
    ///
    /// The stored name is a fresh UUID plus the sanitized extension of
    /// `original_name`, so uploads can never collide or escape the
    /// directory.
    pub async fn store(&self, original_name: &str, data: &[u8]) -> Result<String, UploadError> {
        if data.is_empty() {
            return Err(UploadError::Empty);
        }
        if data.len() > self.max_size {
            return Err(UploadError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;

        let filename = match sanitized_extension(original_name) {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.dir.join(&filename);
        fs::write(&path, data)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;

        tracing::debug!(name = %filename, size = data.len(), "stored uploaded asset");
        Ok(format!("/uploads/{filename}"))
    }
}

/// Extracts a lowercase ASCII-alphanumeric extension of at most 8 chars.
///
/// Anything else is dropped rather than sanitized, since the extension is
/// cosmetic.
fn sanitized_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

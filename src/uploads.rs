//! Image uploads for newsletter drafts
//!
//! Files are written into the uploads directory and served back
//! under `/uploads/<name>`.

use std::path::{Path, PathBuf};

use std::io::ErrorKind;

use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::error::ApiError;

/// Maximum accepted upload size (10MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Public URL prefix the uploads directory is mounted at
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Suffixes tried when uploads land in the same millisecond
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Upload directory manager
#[derive(Debug, Clone)]
pub struct UploadStore {
    /// Upload directory path
    dir: PathBuf,
}

impl UploadStore {
    /// Create a new upload store
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stored file name: upload time in millis, a `-n` suffix on retries,
    /// then the original extension
    fn file_name(stamp: i64, attempt: u32, original_name: Option<&str>) -> String {
        let extension = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        if attempt == 0 {
            format!("{}{}", stamp, extension)
        } else {
            format!("{}-{}{}", stamp, attempt, extension)
        }
    }

    /// Save an uploaded file, returning its public URL
    pub async fn save(&self, original_name: Option<&str>, data: &[u8]) -> Result<String, ApiError> {
        if data.len() > MAX_UPLOAD_SIZE {
            return Err(ApiError::PayloadTooLarge(format!(
                "File too large: {} bytes (max: {})",
                data.len(),
                MAX_UPLOAD_SIZE
            )));
        }

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            error!("Failed to create upload directory {:?}: {}", self.dir, e);
            ApiError::Internal(e.to_string())
        })?;

        let name = self
            .write_new(Utc::now().timestamp_millis(), original_name, data)
            .await?;
        Ok(format!("{}/{}", UPLOADS_ROUTE, name))
    }

    /// Write into a file that did not exist before, bumping the suffix on
    /// name clashes. Returns the stored name.
    async fn write_new(
        &self,
        stamp: i64,
        original_name: Option<&str>,
        data: &[u8],
    ) -> Result<String, ApiError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = Self::file_name(stamp, attempt, original_name);
            let path = self.dir.join(&name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    error!("Failed to create upload {:?}: {}", path, e);
                    return Err(ApiError::Internal(e.to_string()));
                }
            };

            file.write_all(data).await.map_err(|e| {
                error!("Failed to write upload {:?}: {}", path, e);
                ApiError::Internal(e.to_string())
            })?;
            file.flush().await.map_err(|e| ApiError::Internal(e.to_string()))?;

            debug!("Saved upload {:?} ({} bytes)", path, data.len());
            return Ok(name);
        }

        Err(ApiError::Internal(format!(
            "No free upload name for stamp {} after {} attempts",
            stamp, MAX_NAME_ATTEMPTS
        )))
    }
}

//! Request-scoped staging of uploaded images.
//!
//! An uploaded image is streamed into a temporary file while its declared type and size are
//! checked. The resulting [`StagedImage`] owns that file: dropping it removes the file, so the
//! upload is cleaned up on every exit path of the request that created it.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::ImagesConfig;
use crate::errors::{Error, Result};

/// Type and size rules for uploaded images.
#[derive(Debug, Clone)]
pub struct ImagePolicy {
    allowed_content_types: Vec<String>,
    max_size_bytes: u64,
    staging_dir: PathBuf,
}

impl ImagePolicy {
    pub fn from_config(config: &ImagesConfig) -> Self {
        Self {
            allowed_content_types: config.allowed_content_types.iter().map(|ct| ct.trim().to_ascii_lowercase()).collect(),
            max_size_bytes: config.max_size_bytes,
            staging_dir: config.staging_dir(),
        }
    }

    /// Whether a declared content type is on the allow-list. Parameters such as `charset` are ignored.
    pub fn accepts(&self, content_type: Option<&str>) -> bool {
        let Some(content_type) = content_type else {
            return false;
        };
        let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        self.allowed_content_types.iter().any(|allowed| *allowed == essence)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}

/// An accepted upload held in a temporary file for the lifetime of one request.
pub struct StagedImage {
    file: NamedTempFile,
    content_type: String,
    file_name: Option<String>,
    size: u64,
}

impl fmt::Debug for StagedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedImage")
            .field("path", &self.file.path())
            .field("content_type", &self.content_type)
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .finish()
    }
}

impl StagedImage {
    /// Stream an upload into a temporary file.
    ///
    /// Returns `Ok(None)` for an empty part (a file input submitted with nothing selected).
    /// The content type is checked before anything is written and the size after every chunk,
    /// so an oversized upload is abandoned as soon as it crosses the limit.
    pub async fn receive<S, E>(
        chunks: S,
        content_type: Option<&str>,
        file_name: Option<&str>,
        policy: &ImagePolicy,
    ) -> Result<Option<Self>>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Into<Error>,
    {
        let mut chunks = std::pin::pin!(chunks);
        let mut staged: Option<(NamedTempFile, tokio::fs::File)> = None;
        let mut size = 0u64;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(Into::into)?;
            if chunk.is_empty() {
                continue;
            }

            if staged.is_none() {
                if !policy.accepts(content_type) {
                    debug!(content_type = ?content_type, "Rejecting image with disallowed content type");
                    return Err(Error::invalid_image());
                }
                staged = Some(Self::create_temp_file(policy.staging_dir())?);
            }

            size += chunk.len() as u64;
            if size > policy.max_size_bytes() {
                debug!(
                    size = size,
                    max_size_bytes = policy.max_size_bytes(),
                    "Image size limit exceeded, aborting upload"
                );
                return Err(Error::invalid_image());
            }

            if let Some((_, writer)) = staged.as_mut() {
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to write staged image: {e}"))?;
            }
        }

        let Some((file, mut writer)) = staged else {
            debug!("Ignoring empty image part");
            return Ok(None);
        };

        writer
            .flush()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to flush staged image: {e}"))?;

        debug!(path = ?file.path(), size = size, "Staged uploaded image");

        Ok(Some(Self {
            file,
            content_type: content_type.unwrap_or_default().to_string(),
            file_name: file_name.filter(|n| !n.is_empty()).map(str::to_string),
            size,
        }))
    }

    fn create_temp_file(dir: &Path) -> Result<(NamedTempFile, tokio::fs::File)> {
        let file = tempfile::Builder::new()
            .prefix("easel-upload-")
            .tempfile_in(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create staging file in {}: {e}", dir.display()))?;
        let writer = file
            .as_file()
            .try_clone()
            .map_err(|e| anyhow::anyhow!("Failed to open staging file for writing: {e}"))?;
        Ok((file, tokio::fs::File::from_std(writer)))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read the staged bytes back
    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(self.file.path())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read staged image: {e}").into())
    }
}

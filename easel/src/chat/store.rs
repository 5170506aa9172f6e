//! Image stores turn a staged upload into a URL the model can read.
//!
//! Two strategies are available, selected by `images.staging`:
//!
//! - [`InlineImageStore`] embeds the bytes as a base64 `data:` URI. No extra network call.
//! - [`BlobImageStore`] uploads the bytes to blob storage and hands the model the public URL.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::chat::prompt::ImageRef;
use crate::chat::staging::StagedImage;
use crate::config::{BlobConfig, ImageStaging, ImagesConfig};
use crate::errors::{Error, Result, UpstreamService};

/// Create an image store from configuration
///
/// Adding a new staging strategy requires adding a match arm here.
pub fn create_image_store(config: &ImagesConfig, http: reqwest::Client) -> anyhow::Result<Arc<dyn ImageStore>> {
    match config.staging {
        ImageStaging::Inline => Ok(Arc::new(InlineImageStore)),
        ImageStaging::Blob => Ok(Arc::new(BlobImageStore::new(&config.blob, http)?)),
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Produce a reference to a staged image. The staged file itself is left untouched.
    async fn stage(&self, image: &StagedImage) -> Result<ImageRef>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineImageStore;

#[async_trait]
impl ImageStore for InlineImageStore {
    async fn stage(&self, image: &StagedImage) -> Result<ImageRef> {
        let bytes = image.read().await?;
        Ok(ImageRef::new(format!("data:{};base64,{}", image.content_type(), STANDARD.encode(bytes))))
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

#[derive(Debug, Deserialize)]
struct BlobUploadResponse {
    url: String,
}

pub struct BlobImageStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
    path_prefix: String,
}

impl BlobImageStore {
    pub fn new(config: &BlobConfig, http: reqwest::Client) -> anyhow::Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Blob staging requires images.blob.token (or BLOB_READ_WRITE_TOKEN)"))?;

        Ok(Self {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            token,
            path_prefix: config.path_prefix.trim_matches('/').to_string(),
        })
    }

    /// Pathname for a new object: a fresh UUID keeps names unique, the original name keeps them readable
    fn pathname(&self, file_name: Option<&str>) -> String {
        let name = file_name.map(sanitize_file_name).filter(|n| !n.is_empty());
        let object = format!("{}-{}", Uuid::new_v4(), name.as_deref().unwrap_or("image"));
        if self.path_prefix.is_empty() {
            object
        } else {
            format!("{}/{}", self.path_prefix, object)
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    // Browsers may send a full client-side path
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '-' })
        .collect::<String>()
        .trim_matches(['-', '.'])
        .to_string()
}

#[async_trait]
impl ImageStore for BlobImageStore {
    #[instrument(skip_all, fields(size = image.size()))]
    async fn stage(&self, image: &StagedImage) -> Result<ImageRef> {
        let bytes = image.read().await?;
        let url = format!("{}/{}", self.base_url, self.pathname(image.file_name()));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, image.content_type())
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::upstream(UpstreamService::BlobStorage, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(UpstreamService::BlobStorage, format!("HTTP {status} - {body}")));
        }

        let uploaded: BlobUploadResponse = response.json().await.map_err(|e| {
            Error::upstream(
                UpstreamService::BlobStorage,
                format!("HTTP {status} - failed to parse upload response: {e}"),
            )
        })?;

        debug!(url = %uploaded.url, "Uploaded image to blob storage");
        Ok(ImageRef::new(uploaded.url))
    }

    fn name(&self) -> &'static str {
        "blob"
    }
}

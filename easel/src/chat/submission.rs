//! Extraction of a chat turn from the request body.
//!
//! The chat endpoint accepts either `application/json` (`{"message": "..."}`) or
//! `multipart/form-data` with an optional `message` text field and an optional `image` file
//! field. Both forms produce the same [`ChatSubmission`].

use axum::{
    Json,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use futures::StreamExt;
use tracing::debug;

use crate::AppState;
use crate::api::models::chat::ChatJsonRequest;
use crate::chat::staging::StagedImage;
use crate::errors::{Error, Result, image_stream_error};

pub const MESSAGE_FIELD: &str = "message";
pub const IMAGE_FIELD: &str = "image";

/// One user turn: optional text and an optional staged image.
#[derive(Debug, Default)]
pub struct ChatSubmission {
    /// Text as submitted, before trimming
    pub text: Option<String>,
    pub image: Option<StagedImage>,
}

impl ChatSubmission {
    /// The trimmed text, if any is left after trimming
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    async fn from_multipart(mut multipart: Multipart, state: &AppState) -> Result<Self> {
        let mut submission = ChatSubmission::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some(MESSAGE_FIELD) => {
                    submission.text = Some(field.text().await?);
                }
                Some(IMAGE_FIELD) => {
                    if !state.config.images.enabled {
                        return Err(Error::BadRequest {
                            message: "Image uploads are not enabled.".to_string(),
                        });
                    }

                    let content_type = field.content_type().map(str::to_string);
                    let file_name = field.file_name().map(str::to_string);
                    let chunks = field.map(|chunk| chunk.map_err(image_stream_error));
                    let staged =
                        StagedImage::receive(chunks, content_type.as_deref(), file_name.as_deref(), &state.image_policy).await?;

                    // An empty file input still sends a part; only a real image counts towards the limit of one
                    match staged {
                        Some(_) if submission.image.is_some() => {
                            return Err(Error::BadRequest {
                                message: "Only one image can be uploaded per message.".to_string(),
                            });
                        }
                        Some(image) => submission.image = Some(image),
                        None => {}
                    }
                }
                other => {
                    debug!(field = ?other, "Ignoring unknown multipart field");
                }
            }
        }

        Ok(submission)
    }
}

impl FromRequest<AppState> for ChatSubmission {
    type Rejection = Error;

    async fn from_request(req: Request, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .unwrap_or_default();

        match content_type.as_str() {
            "application/json" => {
                let Json(body) = Json::<ChatJsonRequest>::from_request(req, state)
                    .await
                    .map_err(|e| Error::MalformedBody { reason: e.body_text() })?;
                Ok(ChatSubmission {
                    text: body.message,
                    image: None,
                })
            }
            "multipart/form-data" => {
                let multipart = Multipart::from_request(req, state)
                    .await
                    .map_err(|e| Error::MalformedBody { reason: e.body_text() })?;
                Self::from_multipart(multipart, state).await
            }
            other => Err(Error::MalformedBody {
                reason: format!("unsupported content type '{other}'"),
            }),
        }
    }
}

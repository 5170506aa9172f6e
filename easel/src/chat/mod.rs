//! The chat pipeline: validate a submission, stage its image, build the prompt and make one
//! completion call.
//!
//! Each request runs the pipeline once and independently. Nothing is retried, cached or shared
//! between requests; a staged image is removed when the submission is dropped, whichever way the
//! pipeline exits.

pub mod completion;
pub mod prompt;
pub mod staging;
pub mod store;
pub mod submission;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::AppState;
use crate::api::models::chat::ChatMessageResponse;
use crate::config::ResponseShape;
use crate::errors::{Error, Result, UpstreamService};
use prompt::build_prompt;
use submission::ChatSubmission;

/// Successful outcome of one chat turn, in the configured response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatResponse {
    Message(ChatMessageResponse),
    Full(Value),
}

impl IntoResponse for ChatResponse {
    fn into_response(self) -> Response {
        match self {
            ChatResponse::Message(message) => Json(message).into_response(),
            ChatResponse::Full(payload) => Json(payload).into_response(),
        }
    }
}

/// Check that a submission carries something to respond to.
pub fn validate_presence(submission: &ChatSubmission, require_text: bool) -> Result<()> {
    let has_text = submission.trimmed_text().is_some();

    if require_text && !has_text {
        return Err(Error::BadRequest {
            message: "User message is required.".to_string(),
        });
    }

    if !has_text && submission.image.is_none() {
        return Err(Error::BadRequest {
            message: "A message or an image is required.".to_string(),
        });
    }

    Ok(())
}

/// Run one chat turn.
#[instrument(skip_all, fields(has_image = submission.image.is_some()))]
pub async fn respond(state: &AppState, submission: ChatSubmission) -> Result<ChatResponse> {
    validate_presence(&submission, state.config.input.require_text)?;

    let image_ref = match submission.image.as_ref() {
        Some(image) => {
            let image_ref = state.image_store.stage(image).await?;
            debug!(store = state.image_store.name(), inline = image_ref.is_inline(), "Staged image reference");
            Some(image_ref)
        }
        None => None,
    };

    let messages = build_prompt(
        &state.config.completion.system_prompt,
        submission.trimmed_text(),
        image_ref.as_ref(),
    );

    let completion = state.completions.complete(&messages).await?;

    match state.config.response.shape {
        ResponseShape::Full => Ok(ChatResponse::Full(completion.into_payload())),
        ResponseShape::Message => {
            let message = completion
                .content()
                .ok_or_else(|| Error::upstream(UpstreamService::Completion, "response has no choices[0].message.content"))?
                .to_string();
            Ok(ChatResponse::Message(ChatMessageResponse { message }))
        }
    }
}

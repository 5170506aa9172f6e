//! HTTP handlers for the chat endpoint.

use axum::{
    extract::{Request, State},
    http::{Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::{
    AppState,
    chat::{self, ChatResponse, completion::MISSING_KEY_MESSAGE, submission::ChatSubmission},
    errors::{Error, Result},
};

/// Send one chat turn.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    summary = "Send a message",
    description = "Sends the user's message and/or image to the completion model and returns its reply.

Send `application/json` for text only, or `multipart/form-data` with an optional `message` field and an optional `image` file (JPEG or PNG, 5 MiB by default). At least one of the two is required.

With `response.shape: message` (the default) the reply is `{\"message\": \"...\"}`; with `response.shape: full` the completion payload is returned unchanged.",
    request_body(
        content(
            (crate::api::models::chat::ChatJsonRequest = "application/json"),
            (crate::api::models::chat::ChatMultipartRequest = "multipart/form-data"),
        )
    ),
    responses(
        (status = 200, description = "Assistant reply", body = crate::api::models::chat::ChatMessageResponse),
        (status = 400, description = "Missing input, invalid image or unparseable body", body = crate::api::models::chat::ErrorResponse),
        (status = 405, description = "Only POST is accepted", body = crate::api::models::chat::ErrorResponse),
        (status = 500, description = "Missing API key or completion API failure", body = crate::api::models::chat::ErrorResponse),
    )
)]
#[instrument(skip_all)]
pub async fn send_message(State(state): State<AppState>, submission: ChatSubmission) -> Result<ChatResponse> {
    chat::respond(&state, submission).await
}

/// Answers every non-POST verb on the chat route
pub async fn method_not_allowed(method: Method) -> impl IntoResponse {
    ([(header::ALLOW, "POST")], Error::MethodNotAllowed { method: method.to_string() })
}

/// Rejects chat requests up front when no completion credential is configured.
///
/// Runs before method dispatch and body parsing, so a misconfigured server answers every chat
/// request the same way.
pub async fn require_completion_credential(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.completions.is_configured() {
        return Error::Configuration {
            message: MISSING_KEY_MESSAGE.to_string(),
        }
        .into_response();
    }
    next.run(request).await
}

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use thiserror::Error as ThisError;

use crate::api::models::chat::ErrorResponse;

/// Shown for any rejected image, whichever check failed.
pub const INVALID_IMAGE_MESSAGE: &str = "Invalid image type or size too large.";

/// External services the chat pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamService {
    Completion,
    BlobStorage,
}

impl fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamService::Completion => write!(f, "completion API"),
            UpstreamService::BlobStorage => write!(f, "blob storage"),
        }
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// A required setting (usually a credential) is missing from the running configuration
    #[error("{message}")]
    Configuration { message: String },

    /// Invalid request data that the user can correct
    #[error("{message}")]
    BadRequest { message: String },

    /// The request body could not be parsed as JSON or multipart form data
    #[error("Failed to parse request body: {reason}")]
    MalformedBody { reason: String },

    /// The chat endpoint only accepts POST
    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: String },

    /// The completion or blob API could not be reached or answered with a failure
    #[error("{service} request failed: {detail}")]
    Upstream { service: UpstreamService, detail: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_image() -> Self {
        Error::BadRequest {
            message: INVALID_IMAGE_MESSAGE.to_string(),
        }
    }

    pub fn upstream(service: UpstreamService, detail: impl fmt::Display) -> Self {
        Error::Upstream {
            service,
            detail: detail.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::BadRequest { .. } | Error::MalformedBody { .. } => StatusCode::BAD_REQUEST,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::Upstream { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Configuration { message } | Error::BadRequest { message } => message.clone(),
            Error::MalformedBody { .. } => "Error parsing form data.".to_string(),
            Error::MethodNotAllowed { .. } => "Method not allowed. Use POST.".to_string(),
            Error::Upstream {
                service: UpstreamService::Completion,
                ..
            } => "Error connecting to the completion API.".to_string(),
            Error::Upstream {
                service: UpstreamService::BlobStorage,
                ..
            } => "Error uploading image.".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Upstream { .. } | Error::Other(_) => {
                tracing::error!("Chat request failed: {:#}", self);
            }
            Error::Configuration { .. } => {
                tracing::warn!("Configuration error: {}", self);
            }
            Error::BadRequest { .. } | Error::MalformedBody { .. } | Error::MethodNotAllowed { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorResponse { error: self.user_message() };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        Error::MalformedBody { reason: err.body_text() }
    }
}

/// Map a read error from the image part's byte stream.
///
/// Hitting the request body limit part-way through the image means the image is too large.
/// Anywhere else (e.g. an oversized `message` field) it is just a malformed body.
pub fn image_stream_error(err: MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::invalid_image();
    }
    Error::from(err)
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::Configuration { message: "x".into() }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(Error::invalid_image().status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::MalformedBody { reason: "x".into() }.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::MethodNotAllowed { method: "GET".into() }.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            Error::upstream(UpstreamService::Completion, "boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_detail_not_exposed() {
        let err = Error::upstream(UpstreamService::Completion, "HTTP 401: invalid api key sk-abc");

        assert!(err.to_string().contains("sk-abc"));
        assert_eq!(err.user_message(), "Error connecting to the completion API.");
    }

    #[test]
    fn test_malformed_body_reason_not_exposed() {
        let err = Error::MalformedBody {
            reason: "expected value at line 1 column 2".into(),
        };

        assert_eq!(err.user_message(), "Error parsing form data.");
    }

    #[tokio::test]
    async fn test_response_body_is_json_error() {
        let response = Error::MethodNotAllowed { method: "GET".into() }.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Method not allowed. Use POST." }));
    }
}

//! API request/response models for the chat endpoint.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// JSON form of a chat turn.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct ChatJsonRequest {
    /// The user's message
    #[schema(example = "What do you think of impressionism?")]
    pub message: Option<String>,
}

/// Multipart form of a chat turn (documentation only; parsed field by field).
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct ChatMultipartRequest {
    /// The user's message
    pub message: Option<String>,
    /// A JPEG or PNG image
    #[schema(format = Binary, value_type = Option<String>)]
    pub image: Option<Vec<u8>>,
}

/// Assistant reply, returned when `response.shape` is `message`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ChatMessageResponse {
    #[schema(example = "Impressionism captures fleeting light with loose, visible brushwork.")]
    pub message: String,
}

/// Error envelope for every failed chat request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Invalid image type or size too large.")]
    pub error: String,
}

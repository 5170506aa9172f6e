//! OpenAPI document for the chat API, rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Easel",
        description = "Send a message and/or an image, get an art-savvy reply from the configured completion model."
    ),
    paths(api::handlers::chat::send_message),
    components(schemas(
        api::models::chat::ChatJsonRequest,
        api::models::chat::ChatMultipartRequest,
        api::models::chat::ChatMessageResponse,
        api::models::chat::ErrorResponse,
    )),
    tags((name = "chat", description = "Chat with the art critic"))
)]
pub struct ApiDoc;

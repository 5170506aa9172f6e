//! HTTP handlers for static asset serving.

use axum::{
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::static_assets::Assets;

fn asset_response(path: &str, data: Vec<u8>) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    // The client is tiny and unversioned; only the icon is worth caching
    let cache_control = if path.ends_with(".svg") || path.ends_with(".ico") {
        "public, max-age=86400"
    } else {
        "no-cache"
    };

    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, cache_control.to_string()),
        ],
        data,
    )
        .into_response()
}

/// Serve embedded static assets, falling back to `index.html` for unknown paths
#[instrument]
pub async fn serve_embedded_asset(uri: Uri) -> Response {
    let mut path = uri.path().trim_start_matches('/');

    if path.is_empty() || path.ends_with('/') {
        path = "index.html";
    }

    if let Some(content) = Assets::get(path) {
        return asset_response(path, content.data.into_owned());
    }

    debug!("Hitting SPA fallback for: {}", uri.path());
    match Assets::get("index.html") {
        Some(index) => asset_response("index.html", index.data.into_owned()),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode};
    use axum_test::TestServer;

    fn create_test_router() -> Router {
        Router::new().fallback(serve_embedded_asset)
    }

    fn header<'a>(response: &'a axum_test::TestResponse, name: &str) -> Option<&'a str> {
        response.headers().get(name).map(|v| v.to_str().unwrap())
    }

    #[tokio::test]
    async fn test_serve_root_returns_index_html() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(header(&response, "content-type"), Some("text/html"));
        assert_eq!(header(&response, "cache-control"), Some("no-cache"));
        assert!(response.text().contains("<!doctype html>"));
    }

    #[tokio::test]
    async fn test_serve_script_with_javascript_mime() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/script.js").await;

        response.assert_status(StatusCode::OK);
        assert!(header(&response, "content-type").unwrap().contains("javascript"));
        assert!(response.text().contains("/api/chat"));
    }

    #[tokio::test]
    async fn test_serve_stylesheet() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/style.css").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(header(&response, "content-type"), Some("text/css"));
    }

    #[tokio::test]
    async fn test_favicon_is_cacheable() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/favicon.svg").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(header(&response, "content-type"), Some("image/svg+xml"));
        assert_eq!(header(&response, "cache-control"), Some("public, max-age=86400"));
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back_to_index() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/gallery/monet").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(header(&response, "content-type"), Some("text/html"));
        assert!(response.text().contains("<!doctype html>"));
    }
}

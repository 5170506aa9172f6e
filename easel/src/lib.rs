//! # easel: a small art-critic chat service
//!
//! `easel` relays one user turn (a text message, an image, or both) to an OpenAI-compatible chat
//! completion API and hands the reply back to a minimal browser chat widget that it also serves.
//!
//! ## Request pipeline
//!
//! Every `POST /api/chat` request runs the same steps exactly once:
//!
//! 1. **Credential check**: without a completion API key the request fails immediately
//! 2. **Parse**: JSON (`{"message": ...}`) or multipart (`message`, `image`)
//! 3. **Validate**: at least one of text or image; image type and size within limits
//! 4. **Stage**: the image is streamed to a request-scoped temp file, then turned into a
//!    reference the model can read (inline `data:` URI or a blob storage URL)
//! 5. **Prompt**: system instruction, then user text, then user image
//! 6. **Complete**: one outbound call, never retried
//! 7. **Respond**: `{"message": ...}` or the completion payload verbatim, per configuration
//!
//! The temp file is removed on every exit path. There is no conversation history, caching or
//! shared mutable state; requests are independent.
//!
//! ## Modules
//!
//! - [`api`]: HTTP handlers and request/response models
//! - [`chat`]: the pipeline itself (submission, staging, image stores, prompt, completion client)
//! - [`config`]: figment-based configuration with YAML and environment overrides
//! - [`errors`]: error type and its mapping to HTTP responses
//! - [`telemetry`]: tracing subscriber and optional OTLP export
//!
//! ## Running
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run -p easel
//! ```
//!
//! The chat widget is then served at `http://localhost:3000/` and the API reference at `/docs`.

pub mod api;
pub mod chat;
pub mod config;
pub mod errors;
mod openapi;
mod static_assets;
pub mod telemetry;

#[cfg(test)]
mod test_utils;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    chat::{completion::CompletionClient, staging::ImagePolicy, store::ImageStore},
    config::CorsOrigin,
    openapi::ApiDoc,
};
pub use config::Config;

/// Install the process-wide rustls crypto provider.
///
/// Must run before any HTTP client is built. Calling it again is a no-op.
pub fn install_crypto_provider() {
    // Err means a provider is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Application state shared across all request handlers.
///
/// Everything in here is immutable after startup and cheap to clone.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .completions(completions)
///     .image_store(image_store)
///     .image_policy(image_policy)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub completions: CompletionClient,
    pub image_store: Arc<dyn ImageStore>,
    pub image_policy: ImagePolicy,
}

impl AppState {
    /// Build the HTTP client, completion client and image store described by `config`
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        let completions = CompletionClient::new(&config.completion, http.clone());
        let image_store = chat::store::create_image_store(&config.images, http)?;
        let image_policy = ImagePolicy::from_config(&config.images);

        Ok(AppState::builder()
            .completions(completions)
            .image_store(image_store)
            .image_policy(image_policy)
            .config(config)
            .build())
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.cors.allowed_origins;

    // A wildcard cannot be mixed into an explicit origin list
    let allow_origin = if origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                values.push(url.origin().ascii_serialization().parse::<header::HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// - `POST /api/chat`: the chat endpoint, behind the credential guard and request body limit
/// - `GET /healthz`: liveness
/// - `/docs`, `/api-docs/openapi.json`: API reference
/// - anything else: the embedded chat client
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let body_limit = usize::try_from(state.config.images.max_request_bytes)
        .map_err(|_| anyhow::anyhow!("images.max_request_bytes does not fit in memory on this platform"))?;

    let chat_route = post(api::handlers::chat::send_message)
        .fallback(api::handlers::chat::method_not_allowed)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn_with_state(state.clone(), api::handlers::chat::require_completion_credential));

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api/chat", chat_route)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .with_state(state.clone())
        .fallback_service(get(api::handlers::static_assets::serve_embedded_asset));

    let cors_layer = create_cors_layer(&state.config)?;

    Ok(router.layer(cors_layer).layer(TraceLayer::new_for_http()))
}

/// The assembled server: state, router and bind address.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting easel with configuration: {:#?}", config);

        if config.completion.api_key.is_none() {
            warn!("No completion API key configured (set OPENAI_API_KEY); chat requests will fail until one is provided");
        }

        let state = AppState::from_config(config.clone())?;
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "easel listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Chat** (`POST /api/chat`): one user turn in, one assistant reply out
//! - **Health** (`GET /healthz`): liveness probe
//! - **Static client** (everything else): the embedded browser chat widget
//!
//! The chat endpoint is documented with `utoipa`; the rendered reference is served at `/docs`.

pub mod handlers;
pub mod models;

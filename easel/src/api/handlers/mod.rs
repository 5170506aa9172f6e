//! HTTP request handlers.
//!
//! - [`chat`]: the chat endpoint, its method fallback and the credential guard
//! - [`static_assets`]: embedded browser client with SPA fallback

pub mod chat;
pub mod static_assets;

//! API request and response data models.
//!
//! - [`chat`]: chat request bodies, replies and the error envelope

pub mod chat;

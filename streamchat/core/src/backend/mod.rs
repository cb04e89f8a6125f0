//! Chat Service Integration
//!
//! This module provides access to the remote chat service through a common
//! trait interface.
//!
//! # Available Backends
//!
//! - **HTTP**: JSON POST to a per-context endpoint, streamed response body
//!
//! # Usage
//!
//! ```ignore
//! use streamchat_core::backend::{ChatBackend, ChatRequest, HttpBackend};
//!
//! let backend = HttpBackend::new(&config.base_url);
//! let request = ChatRequest::new("Hello!");
//! let response = backend.open_stream("/api/chat-stream", &request).await?;
//! ```

mod http;
mod traits;

pub use http::{HttpBackend, DEFAULT_BASE_URL};
pub use traits::{BackendError, ByteStream, ChatBackend, ChatRequest, ChatResponse};

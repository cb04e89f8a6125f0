//! Chat Backend Traits
//!
//! Trait definitions for the outbound side of a turn. The orchestrator only
//! needs two things from the network: a status code and a byte stream. This
//! abstraction lets tests script both without a socket.
//!
//! # Design Philosophy
//!
//! The ChatBackend trait deliberately stops at raw bytes:
//! - No SSE parsing (that belongs to the streaming consumer)
//! - No status interpretation (a non-success status is still a response)
//! - No retries or timeouts
//!
//! Implementations handle transport details (HTTP client, base URL).

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

/// Errors from the transport layer
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request could not be sent or the connection failed
    #[error("request failed: {0}")]
    Transport(String),

    /// The connection broke while the body was being read
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Raw response body, delivered in whatever chunks the network produced
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// Outbound request body for one turn
///
/// Absent optional fields are omitted from the JSON entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// The user's text
    pub message: String,
    /// Continuation token from an earlier turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Persisted user identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Compiled instruction string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    /// Create a request carrying only the message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the continuation token
    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Set the user identifier
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }
}

/// An opened response: status line received, body not yet read
pub struct ChatResponse {
    /// HTTP status code
    pub status: u16,
    /// Body chunks
    pub body: ByteStream,
}

impl ChatResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Chat backend trait
///
/// Implement this trait to send turns somewhere other than plain HTTP.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Send a request and return as soon as the status is known
    ///
    /// Dropping the returned future aborts the request.
    async fn open_stream(
        &self,
        endpoint: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, BackendError>;
}

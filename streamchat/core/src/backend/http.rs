//! HTTP Backend Implementation
//!
//! Posts a [`ChatRequest`] as JSON to `<base_url><endpoint>` and hands back the
//! status plus the raw body stream.
//!
//! There is no request timeout. A stalled stream ends only when its turn is
//! cancelled.

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{BackendError, ChatBackend, ChatRequest, ChatResponse};

/// Default chat service address
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// HTTP chat backend
#[derive(Clone)]
pub struct HttpBackend {
    /// Scheme, host and port, no trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a new HTTP backend
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client: reqwest::Client::new(),
        }
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for an endpoint path
    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        }
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn open_stream(
        &self,
        endpoint: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, BackendError> {
        let url = self.url(endpoint);
        tracing::debug!(url = %url, has_token = request.conversation_id.is_some(), "Sending chat request");

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        tracing::debug!(url = %url, status, "Chat response headers received");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BackendError::Body(e.to_string())));

        Ok(ChatResponse {
            status,
            body: Box::pin(body),
        })
    }
}

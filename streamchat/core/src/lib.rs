//! Streamchat Core - Headless Streaming Chat Client
//!
//! This crate provides the client side of a turn-based conversational service
//! that answers over an incrementally delivered text stream. It is completely
//! independent of any UI: a surface submits text and renders the
//! [`TranscriptEvent`]s it is sent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        UI Surfaces                               │
//! │           (CLI, TUI, web view: pure renderers)                   │
//! │                  submit / reset / cancel (down)                  │
//! │                  TranscriptEvent (up, broadcast)                 │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼─────────────────────────────────────┐
//! │                     STREAMCHAT CORE                              │
//! │  ┌────────────────────────┴───────────────────────────────────┐ │
//! │  │                   TurnOrchestrator                          │ │
//! │  │  ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌─────────┐ │ │
//! │  │  │  Session  │  │   Prompt   │  │  Stream   │  │  Chat   │ │ │
//! │  │  │  Manager  │  │  Compiler  │  │ Consumer  │  │ Backend │ │ │
//! │  │  └─────┬─────┘  └─────┬──────┘  └───────────┘  └─────────┘ │ │
//! │  └────────┼──────────────┼────────────────────────────────────┘ │
//! │           └──────┬───────┘                                       │
//! │            Persistence (session + durable KeyValueStore)         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`TurnOrchestrator`]: Submits turns and runs them on spawned tasks
//! - [`SessionManager`]: Per-context history, continuation tokens, turn slots
//! - [`StreamConsumer`]: Byte stream to transcript mutations
//! - [`PromptProfile`]: Layered behavior preferences, compiled by [`compile`]
//! - [`ChatBackend`]: Outbound HTTP seam
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamchat_core::{
//!     ClientConfig, ContextKey, HttpBackend, Persistence, TurnOrchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> streamchat_core::Result<()> {
//!     let config = ClientConfig::default();
//!     let backend = Arc::new(HttpBackend::new(&config.base_url));
//!     let orchestrator =
//!         TurnOrchestrator::from_config(&config, backend, Persistence::in_memory())?;
//!
//!     let mut events = orchestrator.sessions().subscribe();
//!     let context = ContextKey::new("project-visualizer");
//!     orchestrator.sessions().activate(&context)?;
//!
//!     if let Some(turn) = orchestrator.submit(&context, "Plan a product launch")? {
//!         let outcome = turn.wait().await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Chat service abstraction (HTTP)
//! - [`bots`]: Registry of contexts and their endpoints
//! - [`config`]: TOML / environment / CLI configuration
//! - [`error`]: Error types
//! - [`messages`]: Identifiers and transcript events
//! - [`orchestrator`]: Turn orchestration
//! - [`prompt`]: Prompt profile, catalogs, compilation and storage
//! - [`session`]: Conversation and message data
//! - [`sessions`]: Multi-context session manager
//! - [`store`]: Key-value persistence adapter
//! - [`streaming`]: Streaming response consumer
//!
//! # No UI Dependencies
//!
//! This crate never prints. Diagnostics go through `tracing`; the transcript
//! goes through the event channel.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod bots;
pub mod config;
pub mod error;
pub mod messages;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod sessions;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use backend::{BackendError, ChatBackend, ChatRequest, ChatResponse, HttpBackend};
pub use bots::{BotDefinition, BotRegistry};
pub use error::{ClientError, Result};
pub use messages::{ContextKey, MessageId, MessageRole, TranscriptEvent};
pub use orchestrator::{TurnHandle, TurnOrchestrator};
pub use session::{Conversation, Message};
pub use sessions::{SessionManager, TurnTicket};
pub use store::{FileStore, KeyValueStore, MemoryStore, Persistence, StoreError};

// Prompt exports
pub use prompt::{compile, PresetFamily, ProfileError, PromptProfile};

// Streaming exports
pub use streaming::{
    StreamConsumer, TranscriptMutation, TranscriptSink, TurnOutcome, TurnState,
    GENERIC_FAILURE_TEXT, NO_RESPONSE_TEXT,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BusyPolicy, ClientConfig,
    ConfigError, ConfigOverrides, ConfigSource,
};

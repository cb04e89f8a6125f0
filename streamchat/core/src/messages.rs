//! Transcript Identifiers and Events
//!
//! Identifiers shared by every layer of the client, and the events the
//! session manager broadcasts to whatever surface is rendering the transcript.
//!
//! # Design Philosophy
//!
//! Surfaces are pure renderers. They never mutate conversation state directly;
//! they subscribe to [`TranscriptEvent`]s and redraw what they are told. Each
//! event names the context it belongs to so a surface showing one bot can
//! ignore traffic for the others.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::session::Message;
use crate::streaming::TurnOutcome;

/// Message identifier
///
/// Backed by a process-wide counter, so ids are unique and their ordering
/// matches creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Creation sequence number
    #[must_use]
    pub fn sequence(self) -> u64 {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// Identifies one independent conversation (one bot configuration)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextKey(String);

impl ContextKey {
    /// Create a context key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ContextKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Streamed answer from the chat service
    Assistant,
}

/// Transcript changes broadcast to surfaces
#[derive(Clone, Debug)]
pub enum TranscriptEvent {
    /// A message was appended to a conversation
    MessageAdded {
        /// Owning context
        context: ContextKey,
        /// Snapshot of the new message
        message: Message,
    },

    /// A message's content was replaced wholesale
    ContentReplaced {
        /// Owning context
        context: ContextKey,
        /// Message that changed
        message_id: MessageId,
        /// Full new content
        content: String,
    },

    /// A message was deleted (cancelled placeholder)
    MessageRemoved {
        /// Owning context
        context: ContextKey,
        /// Message that was removed
        message_id: MessageId,
    },

    /// The server issued a continuation token for a context
    ContinuationUpdated {
        /// Owning context
        context: ContextKey,
        /// New token
        token: String,
    },

    /// A turn reached its terminal state
    TurnFinished {
        /// Owning context
        context: ContextKey,
        /// Assistant message the turn was filling
        message_id: MessageId,
        /// How the turn ended
        outcome: TurnOutcome,
    },

    /// A context's history and token were cleared
    ContextReset {
        /// The context that was reset
        context: ContextKey,
    },
}

impl TranscriptEvent {
    /// Context this event belongs to
    #[must_use]
    pub fn context(&self) -> &ContextKey {
        match self {
            Self::MessageAdded { context, .. }
            | Self::ContentReplaced { context, .. }
            | Self::MessageRemoved { context, .. }
            | Self::ContinuationUpdated { context, .. }
            | Self::TurnFinished { context, .. }
            | Self::ContextReset { context } => context,
        }
    }
}

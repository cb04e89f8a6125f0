//! Conversation State
//!
//! One [`Conversation`] per context key: the ordered message history plus the
//! server-issued continuation token that gives the service multi-turn memory.
//!
//! # Design Philosophy
//!
//! A conversation is plain data. It knows nothing about HTTP, cancellation or
//! persistence; the session manager decides *when* to mutate it and this
//! module only guarantees the mutations keep the transcript consistent: a
//! single streaming placeholder at a time, creation order preserved, and
//! cancelled placeholders removed rather than left half-written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{ContextKey, MessageId, MessageRole};

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Conversation this message belongs to
    pub context: ContextKey,
    /// Whether the message is still being streamed
    pub streaming: bool,
}

impl Message {
    /// Create a completed user message
    pub fn user(context: ContextKey, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
            context,
            streaming: false,
        }
    }

    /// Create an empty assistant placeholder that a turn will fill
    pub fn placeholder(context: ContextKey) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            context,
            streaming: true,
        }
    }
}

/// A conversation bound to one context key
#[derive(Clone, Debug)]
pub struct Conversation {
    /// Owning context
    context: ContextKey,
    /// Server-issued continuation token
    continuation_token: Option<String>,
    /// Conversation history in creation order
    messages: Vec<Message>,
    /// Currently streaming message (if any)
    streaming_id: Option<MessageId>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(context: ContextKey) -> Self {
        Self {
            context,
            continuation_token: None,
            messages: Vec::new(),
            streaming_id: None,
        }
    }

    /// The context this conversation belongs to
    #[must_use]
    pub fn context(&self) -> &ContextKey {
        &self.context
    }

    /// Current continuation token
    #[must_use]
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    /// Store a server-issued continuation token
    pub fn set_continuation_token(&mut self, token: impl Into<String>) {
        self.continuation_token = Some(token.into());
    }

    /// Forget the continuation token
    pub fn clear_continuation_token(&mut self) {
        self.continuation_token = None;
    }

    /// Add a user message, returning a snapshot of it
    pub fn add_user_message(&mut self, content: impl Into<String>) -> Message {
        let msg = Message::user(self.context.clone(), content);
        self.messages.push(msg.clone());
        msg
    }

    /// Append an empty assistant placeholder and mark it as streaming
    ///
    /// Any previous placeholder is removed first; only one may exist.
    pub fn start_assistant_response(&mut self) -> Message {
        self.cancel_streaming();
        let msg = Message::placeholder(self.context.clone());
        self.streaming_id = Some(msg.id);
        self.messages.push(msg.clone());
        msg
    }

    /// Replace a message's content. Returns false if the message is gone.
    pub fn replace_content(&mut self, id: MessageId, content: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) => {
                content.clone_into(&mut msg.content);
                true
            }
            None => false,
        }
    }

    /// Commit a streamed message as final
    pub fn complete_streaming(&mut self, id: MessageId) -> Option<&Message> {
        if self.streaming_id == Some(id) {
            self.streaming_id = None;
        }
        let msg = self.messages.iter_mut().find(|m| m.id == id)?;
        msg.streaming = false;
        Some(msg)
    }

    /// Remove the current streaming placeholder, returning its id
    pub fn cancel_streaming(&mut self) -> Option<MessageId> {
        let streaming_id = self.streaming_id.take()?;
        self.messages.retain(|m| m.id != streaming_id);
        Some(streaming_id)
    }

    /// Remove a message by id. Returns false if it was already gone.
    pub fn remove_message(&mut self, id: MessageId) -> bool {
        if self.streaming_id == Some(id) {
            self.streaming_id = None;
        }
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Get the current streaming message ID
    #[must_use]
    pub fn streaming_message_id(&self) -> Option<MessageId> {
        self.streaming_id
    }

    /// Check if currently streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming_id.is_some()
    }

    /// Get message by ID
    #[must_use]
    pub fn get_message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// All messages in creation order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get current message count
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Clear message history and the continuation token
    pub fn reset(&mut self) {
        self.messages.clear();
        self.streaming_id = None;
        self.continuation_token = None;
    }
}

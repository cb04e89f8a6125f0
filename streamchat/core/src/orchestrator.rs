//! Turn Orchestrator
//!
//! Glue between the session manager, the prompt engine, the backend and the
//! stream consumer. A submission becomes a spawned task that sends the
//! request, streams the answer into the transcript, and reports a
//! [`TurnOutcome`].
//!
//! # Turn Flow
//!
//! ```text
//! submit(ctx, text)
//!   │
//!   ├─► SessionManager::begin_turn ──► TurnTicket (placeholder id, token, prompt)
//!   │
//!   └─► tokio::spawn ─┬─► ChatBackend::open_stream   (Sending, cancellable)
//!                     ├─► StreamConsumer::consume    (Streaming, cancellable)
//!                     └─► SessionManager::finish_turn
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backend::ChatBackend;
use crate::bots::BotRegistry;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::messages::{ContextKey, MessageId};
use crate::prompt::PromptProfile;
use crate::sessions::{SessionManager, TurnTicket};
use crate::store::Persistence;
use crate::streaming::{StreamConsumer, TurnOutcome, GENERIC_FAILURE_TEXT};

/// A running turn
#[derive(Debug)]
pub struct TurnHandle {
    context: ContextKey,
    message_id: MessageId,
    join: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Owning context
    #[must_use]
    pub fn context(&self) -> &ContextKey {
        &self.context
    }

    /// Assistant message this turn fills
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Whether the turn has reached a terminal state
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the turn's outcome
    pub async fn wait(self) -> TurnOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(context = %self.context, message_id = %self.message_id, error = %e, "Turn task failed");
                TurnOutcome::Errored {
                    message: GENERIC_FAILURE_TEXT.to_string(),
                }
            }
        }
    }
}

/// Runs turns for every context
pub struct TurnOrchestrator {
    backend: Arc<dyn ChatBackend>,
    sessions: Arc<SessionManager>,
    user_id: String,
    reset_on_profile_save: bool,
}

impl TurnOrchestrator {
    /// Create an orchestrator over existing parts
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        sessions: Arc<SessionManager>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            sessions,
            user_id: user_id.into(),
            reset_on_profile_save: false,
        }
    }

    /// Build everything a configuration describes
    ///
    /// Loads (or generates) the persisted user id.
    pub fn from_config(
        config: &ClientConfig,
        backend: Arc<dyn ChatBackend>,
        persistence: Persistence,
    ) -> Result<Self> {
        config.validate()?;
        let registry: BotRegistry = config.registry();
        let user_id = persistence.ensure_user_id()?;
        let sessions = Arc::new(SessionManager::new(persistence, registry, config.busy_policy));

        tracing::info!(
            backend = backend.name(),
            busy_policy = %config.busy_policy,
            bots = sessions.registry().len(),
            "Turn orchestrator ready"
        );
        Ok(Self::new(backend, sessions, user_id)
            .with_reset_on_profile_save(config.reset_on_profile_save))
    }

    /// Reset a context's conversation whenever its profile is saved
    #[must_use]
    pub fn with_reset_on_profile_save(mut self, enabled: bool) -> Self {
        self.reset_on_profile_save = enabled;
        self
    }

    /// The session manager
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The user id sent with every request
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Submit user text to a context
    ///
    /// Returns `Ok(None)` when the submission is a no-op (blank text, or a busy
    /// context under the reject policy). Must be called within a Tokio runtime.
    pub fn submit(&self, context: &ContextKey, text: &str) -> Result<Option<TurnHandle>> {
        let Some(ticket) = self.sessions.begin_turn(context, text)? else {
            return Ok(None);
        };

        let message_id = ticket.message_id;
        let join = tokio::spawn(run_turn(
            Arc::clone(&self.backend),
            Arc::clone(&self.sessions),
            ticket,
            self.user_id.clone(),
        ));

        Ok(Some(TurnHandle {
            context: context.clone(),
            message_id,
            join,
        }))
    }

    /// Cancel a context's running turn, keeping its history
    pub fn cancel(&self, context: &ContextKey) -> bool {
        self.sessions.cancel(context)
    }

    /// Cancel any running turn and clear the context's history and token
    pub fn reset(&self, context: &ContextKey) -> Result<()> {
        self.sessions.reset(context)
    }

    /// Persist a profile and refresh the context's compiled prompt
    ///
    /// Returns the compiled prompt.
    pub fn save_profile(&self, context: &ContextKey, profile: PromptProfile) -> Result<String> {
        let compiled = self.sessions.save_profile(context, profile)?;
        if self.reset_on_profile_save {
            self.sessions.reset(context)?;
        }
        Ok(compiled)
    }
}

async fn run_turn(
    backend: Arc<dyn ChatBackend>,
    sessions: Arc<SessionManager>,
    ticket: TurnTicket,
    user_id: String,
) -> TurnOutcome {
    let sink = sessions.sink(&ticket);
    let request = ticket.request.clone().with_user(user_id);
    let mut consumer = StreamConsumer::new(ticket.message_id, ticket.cancel.clone());
    consumer.mark_sending();

    // Dropping the open_stream future aborts the HTTP call
    let opened = tokio::select! {
        biased;
        () = ticket.cancel.cancelled() => None,
        result = backend.open_stream(&ticket.endpoint, &request) => Some(result),
    };

    let outcome = match opened {
        None => consumer.cancel(&sink),
        Some(Err(e)) => consumer.transport_failed(&e, &sink),
        Some(Ok(response)) => consumer.consume(response, &sink).await,
    };

    sessions.finish_turn(&ticket.context, ticket.message_id, &outcome);
    outcome
}

//! Conversation Session Manager
//!
//! Owns one [`Conversation`] per context key and the single in-flight turn
//! slot for each. Everything that changes a transcript goes through here, so
//! the at-most-one-turn rule and the cancelled-turn rule are enforced in one
//! place.
//!
//! # Design Philosophy
//!
//! - **One lock**: all slots live behind a single `parking_lot::Mutex`. Every
//!   mutation, including the "is this turn still current?" check, happens
//!   while holding it, and it is never held across an `.await`.
//! - **Stale turns are mute**: once a turn is cancelled (preempted, reset, or
//!   explicitly cancelled) its slot entry is gone, so any late content or token
//!   it produces is dropped.
//! - **Contexts are independent**: switching, resetting or cancelling one
//!   context never touches another.
//!
//! # Turn Lifecycle
//!
//! ```text
//! begin_turn ──► TurnTicket ──► (orchestrator streams) ──► apply()* ──► finish_turn
//!      │                                                        ▲
//!      └── preempt / reset / cancel ── removes placeholder ─────┘ (later writes dropped)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::backend::ChatRequest;
use crate::bots::{BotDefinition, BotRegistry};
use crate::config::BusyPolicy;
use crate::error::{ClientError, Result};
use crate::messages::{ContextKey, MessageId, TranscriptEvent};
use crate::prompt::{self, load_profile, PromptProfile};
use crate::session::{Conversation, Message};
use crate::store::{keys, Persistence};
use crate::streaming::{TranscriptMutation, TranscriptSink, TurnOutcome};

/// Capacity of the transcript event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The in-flight turn of one context
#[derive(Debug)]
struct ActiveTurn {
    /// Assistant placeholder being filled
    message_id: MessageId,
    /// Signalled on preemption, reset or cancel
    cancel: CancellationToken,
}

/// Everything held for one context
#[derive(Debug)]
struct ContextSlot {
    conversation: Conversation,
    active: Option<ActiveTurn>,
    profile: PromptProfile,
    compiled_prompt: String,
}

impl ContextSlot {
    fn new(context: &ContextKey, token: Option<String>, profile: PromptProfile) -> Self {
        let mut conversation = Conversation::new(context.clone());
        if let Some(token) = token {
            conversation.set_continuation_token(token);
        }
        Self {
            conversation,
            active: None,
            compiled_prompt: profile.compiled(),
            profile,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    slots: HashMap<ContextKey, ContextSlot>,
    active_context: Option<ContextKey>,
}

/// What the orchestrator needs to run a turn that was just started
#[derive(Clone, Debug)]
pub struct TurnTicket {
    /// Owning context
    pub context: ContextKey,
    /// Assistant placeholder to fill
    pub message_id: MessageId,
    /// Fires when the turn is superseded
    pub cancel: CancellationToken,
    /// Endpoint path of the context's bot
    pub endpoint: String,
    /// Request body (without the user id)
    pub request: ChatRequest,
}

/// Read-only view of a context's turn slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveTurnView {
    /// Assistant placeholder being filled
    pub message_id: MessageId,
}

/// Multiplexes conversations across context keys
pub struct SessionManager {
    state: Mutex<State>,
    persistence: Persistence,
    registry: BotRegistry,
    busy_policy: BusyPolicy,
    events: broadcast::Sender<TranscriptEvent>,
}

impl SessionManager {
    /// Create a manager over a registry and persistence adapter
    #[must_use]
    pub fn new(persistence: Persistence, registry: BotRegistry, busy_policy: BusyPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            persistence,
            registry,
            busy_policy,
            events,
        }
    }

    /// Subscribe to transcript events
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.events.subscribe()
    }

    /// The bot registry
    #[must_use]
    pub fn registry(&self) -> &BotRegistry {
        &self.registry
    }

    /// The configured busy policy
    #[must_use]
    pub fn busy_policy(&self) -> BusyPolicy {
        self.busy_policy
    }

    /// The persistence adapter
    #[must_use]
    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// Make `context` the active one, reloading its token and profile from storage
    ///
    /// Messages already held for the context are kept, as is any turn it has in
    /// flight; while that turn runs its token is left as is. Other contexts are
    /// not touched.
    pub fn activate(&self, context: &ContextKey) -> Result<()> {
        let (token, profile) = self.load_persisted(context)?;

        let mut state = self.state.lock();
        match state.slots.get_mut(context) {
            Some(slot) => {
                // A running turn owns the token until it finishes
                if slot.active.is_none() {
                    match token {
                        Some(token) => slot.conversation.set_continuation_token(token),
                        None => slot.conversation.clear_continuation_token(),
                    }
                }
                slot.compiled_prompt = profile.compiled();
                slot.profile = profile;
            }
            None => {
                state
                    .slots
                    .insert(context.clone(), ContextSlot::new(context, token, profile));
            }
        }
        state.active_context = Some(context.clone());
        tracing::debug!(context = %context, "Activated context");
        Ok(())
    }

    /// Currently active context
    #[must_use]
    pub fn active_context(&self) -> Option<ContextKey> {
        self.state.lock().active_context.clone()
    }

    /// Start a turn: append the user message and an assistant placeholder
    ///
    /// Returns `None` (and changes nothing) for blank text, or when the context
    /// is busy under [`BusyPolicy::Reject`]. Under [`BusyPolicy::Preempt`] the
    /// running turn is cancelled and its placeholder removed first.
    pub fn begin_turn(&self, context: &ContextKey, text: &str) -> Result<Option<TurnTicket>> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(context = %context, "Ignoring blank submission");
            return Ok(None);
        }
        let bot = self.bot(context)?.clone();
        self.ensure_slot(context)?;

        let mut state = self.state.lock();
        let slot = state
            .slots
            .get_mut(context)
            .ok_or_else(|| ClientError::UnknownContext(context.to_string()))?;

        if slot.active.is_some() {
            match self.busy_policy {
                BusyPolicy::Reject => {
                    tracing::debug!(context = %context, "Context busy, submission rejected");
                    return Ok(None);
                }
                BusyPolicy::Preempt => {
                    tracing::debug!(context = %context, "Preempting running turn");
                    self.cancel_active(context, slot);
                }
            }
        }

        let user = slot.conversation.add_user_message(text);
        self.emit(TranscriptEvent::MessageAdded {
            context: context.clone(),
            message: user,
        });
        let placeholder = slot.conversation.start_assistant_response();
        let message_id = placeholder.id;
        self.emit(TranscriptEvent::MessageAdded {
            context: context.clone(),
            message: placeholder,
        });

        let cancel = CancellationToken::new();
        slot.active = Some(ActiveTurn {
            message_id,
            cancel: cancel.clone(),
        });

        let request = ChatRequest::new(text)
            .with_conversation_id(slot.conversation.continuation_token().map(str::to_string))
            .with_system_prompt(bot.effective_prompt(&slot.compiled_prompt));

        tracing::info!(context = %context, message_id = %message_id, "Turn started");
        Ok(Some(TurnTicket {
            context: context.clone(),
            message_id,
            cancel,
            endpoint: bot.endpoint,
            request,
        }))
    }

    /// Apply a mutation produced by a turn
    ///
    /// Dropped unless the turn is still the context's active one; a removal of
    /// the turn's own placeholder is always honored.
    pub fn apply(&self, context: &ContextKey, message_id: MessageId, mutation: TranscriptMutation) {
        let token = self.apply_locked(context, message_id, mutation);

        // Written after the lock is released; the store may hit the disk
        if let Some(token) = token {
            if let Err(e) = self
                .persistence
                .session
                .save(&keys::conversation_id(context), &token)
            {
                tracing::warn!(context = %context, error = %e, "Failed to persist continuation token");
            }
        }
    }

    /// Apply under the lock; returns a token that still needs persisting
    fn apply_locked(
        &self,
        context: &ContextKey,
        message_id: MessageId,
        mutation: TranscriptMutation,
    ) -> Option<String> {
        let mut state = self.state.lock();
        let slot = state.slots.get_mut(context)?;

        let current = slot
            .active
            .as_ref()
            .is_some_and(|turn| turn.message_id == message_id && !turn.cancel.is_cancelled());

        match mutation {
            TranscriptMutation::RemoveMessage { message_id: target } => {
                if slot.conversation.remove_message(target) {
                    self.emit(TranscriptEvent::MessageRemoved {
                        context: context.clone(),
                        message_id: target,
                    });
                }
            }
            _ if !current => {
                tracing::debug!(context = %context, message_id = %message_id, "Dropping write from superseded turn");
            }
            TranscriptMutation::ReplaceContent {
                message_id: target,
                content,
            } => {
                if slot.conversation.replace_content(target, &content) {
                    self.emit(TranscriptEvent::ContentReplaced {
                        context: context.clone(),
                        message_id: target,
                        content,
                    });
                }
            }
            TranscriptMutation::SetContinuationToken { token } => {
                slot.conversation.set_continuation_token(token.clone());
                self.emit(TranscriptEvent::ContinuationUpdated {
                    context: context.clone(),
                    token: token.clone(),
                });
                return Some(token);
            }
        }
        None
    }

    /// Record a turn's terminal outcome and free the slot if it is still held
    pub fn finish_turn(&self, context: &ContextKey, message_id: MessageId, outcome: &TurnOutcome) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get_mut(context) {
            if slot.active.as_ref().is_some_and(|t| t.message_id == message_id) {
                slot.active = None;
                if !matches!(outcome, TurnOutcome::Cancelled) {
                    slot.conversation.complete_streaming(message_id);
                }
            }
        }

        tracing::info!(context = %context, message_id = %message_id, outcome = ?outcome.state(), "Turn finished");
        self.emit(TranscriptEvent::TurnFinished {
            context: context.clone(),
            message_id,
            outcome: outcome.clone(),
        });
    }

    /// Cancel the running turn without touching history
    ///
    /// Returns whether a turn was running.
    pub fn cancel(&self, context: &ContextKey) -> bool {
        let mut state = self.state.lock();
        match state.slots.get_mut(context) {
            Some(slot) if slot.active.is_some() => {
                self.cancel_active(context, slot);
                true
            }
            _ => false,
        }
    }

    /// Cancel any running turn and clear the context's history and token
    ///
    /// Only `context` is affected.
    pub fn reset(&self, context: &ContextKey) -> Result<()> {
        {
            let mut state = self.state.lock();
            if let Some(slot) = state.slots.get_mut(context) {
                if slot.active.is_some() {
                    self.cancel_active(context, slot);
                }
                slot.conversation.reset();
            }
            self.emit(TranscriptEvent::ContextReset {
                context: context.clone(),
            });
        }
        self.persistence
            .session
            .remove(&keys::conversation_id(context))?;
        tracing::info!(context = %context, "Context reset");
        Ok(())
    }

    /// Whether a turn is in flight for `context`
    #[must_use]
    pub fn is_busy(&self, context: &ContextKey) -> bool {
        self.state
            .lock()
            .slots
            .get(context)
            .is_some_and(|slot| slot.active.is_some())
    }

    /// The in-flight turn of `context`, if any
    #[must_use]
    pub fn active_turn(&self, context: &ContextKey) -> Option<ActiveTurnView> {
        self.state
            .lock()
            .slots
            .get(context)?
            .active
            .as_ref()
            .map(|turn| ActiveTurnView {
                message_id: turn.message_id,
            })
    }

    /// Messages of `context` in creation order
    #[must_use]
    pub fn messages_for(&self, context: &ContextKey) -> Vec<Message> {
        self.state
            .lock()
            .slots
            .get(context)
            .map(|slot| slot.conversation.messages().to_vec())
            .unwrap_or_default()
    }

    /// Messages of the active context in creation order
    #[must_use]
    pub fn active_messages(&self) -> Vec<Message> {
        let state = self.state.lock();
        state
            .active_context
            .as_ref()
            .and_then(|context| state.slots.get(context))
            .map(|slot| slot.conversation.messages().to_vec())
            .unwrap_or_default()
    }

    /// Current continuation token of `context`
    #[must_use]
    pub fn continuation_token(&self, context: &ContextKey) -> Option<String> {
        self.state
            .lock()
            .slots
            .get(context)?
            .conversation
            .continuation_token()
            .map(str::to_string)
    }

    /// Loaded profile of `context`
    #[must_use]
    pub fn profile(&self, context: &ContextKey) -> Option<PromptProfile> {
        self.state
            .lock()
            .slots
            .get(context)
            .map(|slot| slot.profile.clone())
    }

    /// Cached compiled prompt of `context`
    #[must_use]
    pub fn compiled_prompt(&self, context: &ContextKey) -> Option<String> {
        self.state
            .lock()
            .slots
            .get(context)
            .map(|slot| slot.compiled_prompt.clone())
    }

    /// Validate, persist, and cache a new profile for `context`
    ///
    /// The profile's preset family is taken from the context's bot. Returns the
    /// compiled prompt.
    pub fn save_profile(&self, context: &ContextKey, mut profile: PromptProfile) -> Result<String> {
        profile.preset_family = self.bot(context)?.preset_family;
        self.ensure_slot(context)?;

        let compiled = prompt::save_profile(self.persistence.durable.as_ref(), context, &profile)?;
        if let Some(slot) = self.state.lock().slots.get_mut(context) {
            slot.profile = profile;
            slot.compiled_prompt.clone_from(&compiled);
        }
        Ok(compiled)
    }

    /// Transcript sink that routes a turn's mutations back into this manager
    #[must_use]
    pub fn sink(self: &Arc<Self>, ticket: &TurnTicket) -> TurnSink {
        TurnSink {
            sessions: Arc::clone(self),
            context: ticket.context.clone(),
            message_id: ticket.message_id,
        }
    }

    fn bot(&self, context: &ContextKey) -> Result<&BotDefinition> {
        self.registry
            .get(context)
            .ok_or_else(|| ClientError::UnknownContext(context.to_string()))
    }

    /// Read the stored token and profile of `context`, without the lock
    fn load_persisted(&self, context: &ContextKey) -> Result<(Option<String>, PromptProfile)> {
        let bot = self.bot(context)?;
        let token = self.persistence.continuation_token(context)?;
        let profile = load_profile(self.persistence.durable.as_ref(), context, bot.preset_family)?;
        tracing::debug!(context = %context, has_token = token.is_some(), "Loaded context state");
        Ok((token, profile))
    }

    /// Create the slot for `context` if absent, loading persisted state
    fn ensure_slot(&self, context: &ContextKey) -> Result<()> {
        if self.state.lock().slots.contains_key(context) {
            return Ok(());
        }

        // A concurrent loader losing the race is harmless
        let (token, profile) = self.load_persisted(context)?;
        self.state
            .lock()
            .slots
            .entry(context.clone())
            .or_insert_with(|| ContextSlot::new(context, token, profile));
        Ok(())
    }

    /// Signal the active turn and remove its placeholder
    fn cancel_active(&self, context: &ContextKey, slot: &mut ContextSlot) {
        let Some(turn) = slot.active.take() else {
            return;
        };
        turn.cancel.cancel();
        if slot.conversation.remove_message(turn.message_id) {
            self.emit(TranscriptEvent::MessageRemoved {
                context: context.clone(),
                message_id: turn.message_id,
            });
        }
        tracing::debug!(context = %context, message_id = %turn.message_id, "Cancelled turn");
    }

    fn emit(&self, event: TranscriptEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Routes one turn's mutations into the [`SessionManager`]
pub struct TurnSink {
    sessions: Arc<SessionManager>,
    context: ContextKey,
    message_id: MessageId,
}

impl TranscriptSink for TurnSink {
    fn apply(&self, mutation: TranscriptMutation) {
        self.sessions.apply(&self.context, self.message_id, mutation);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::messages::MessageRole;
    use crate::store::KeyValueStore;

    fn manager(policy: BusyPolicy) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Persistence::in_memory(),
            BotRegistry::builtin(),
            policy,
        ))
    }

    fn ctx(key: &str) -> ContextKey {
        ContextKey::new(key)
    }

    #[test]
    fn test_blank_submission_is_noop() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("project-visualizer");
        assert!(sessions.begin_turn(&k, "   \n").unwrap().is_none());
        assert!(sessions.messages_for(&k).is_empty());
        assert!(!sessions.is_busy(&k));
    }

    #[test]
    fn test_unknown_context_rejected() {
        let sessions = manager(BusyPolicy::Preempt);
        assert!(matches!(
            sessions.activate(&ctx("ghost")),
            Err(ClientError::UnknownContext(_))
        ));
    }

    #[test]
    fn test_begin_turn_appends_user_and_placeholder() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("project-visualizer");
        let ticket = sessions.begin_turn(&k, "  plan my launch ").unwrap().unwrap();

        let messages = sessions.messages_for(&k);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "plan my launch");
        assert_eq!(messages[1].id, ticket.message_id);
        assert!(messages[1].streaming);
        assert!(sessions.is_busy(&k));

        assert_eq!(ticket.request.message, "plan my launch");
        assert!(ticket.request.conversation_id.is_none());
        // Empty profile falls back to the bot's default prompt
        assert!(ticket.request.system_prompt.is_some());
        assert_eq!(ticket.endpoint, "/api/chat-stream");
    }

    #[test]
    fn test_preempt_removes_previous_placeholder() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("project-visualizer");
        let first = sessions.begin_turn(&k, "a").unwrap().unwrap();
        let second = sessions.begin_turn(&k, "b").unwrap().unwrap();

        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());

        let assistants: Vec<_> = sessions
            .messages_for(&k)
            .into_iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].id, second.message_id);
        assert_eq!(
            sessions.active_turn(&k),
            Some(ActiveTurnView {
                message_id: second.message_id
            })
        );
    }

    #[test]
    fn test_reject_policy_ignores_busy_submission() {
        let sessions = manager(BusyPolicy::Reject);
        let k = ctx("x");
        let first = sessions.begin_turn(&k, "a").unwrap().unwrap();
        assert!(sessions.begin_turn(&k, "b").unwrap().is_none());
        assert!(!first.cancel.is_cancelled());
        assert_eq!(sessions.messages_for(&k).len(), 2);
    }

    #[test]
    fn test_superseded_turn_writes_are_dropped() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("project-visualizer");
        let stale = sessions.begin_turn(&k, "a").unwrap().unwrap();
        let stale_sink = sessions.sink(&stale);
        let fresh = sessions.begin_turn(&k, "b").unwrap().unwrap();

        stale_sink.apply(TranscriptMutation::ReplaceContent {
            message_id: stale.message_id,
            content: "late".into(),
        });
        stale_sink.apply(TranscriptMutation::SetContinuationToken { token: "stale".into() });
        sessions.finish_turn(&k, stale.message_id, &TurnOutcome::Completed { text: "late".into() });

        assert!(sessions.continuation_token(&k).is_none());
        assert!(sessions.messages_for(&k).iter().all(|m| m.content != "late"));
        assert!(sessions.is_busy(&k));
        assert_eq!(sessions.active_turn(&k).unwrap().message_id, fresh.message_id);
    }

    #[test]
    fn test_token_written_through_to_session_store() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("project-visualizer");
        let ticket = sessions.begin_turn(&k, "hi").unwrap().unwrap();
        sessions
            .sink(&ticket)
            .apply(TranscriptMutation::SetContinuationToken { token: "c1".into() });

        assert_eq!(sessions.continuation_token(&k).as_deref(), Some("c1"));
        assert_eq!(
            sessions
                .persistence()
                .session
                .load("conversationId_project-visualizer")
                .unwrap()
                .as_deref(),
            Some("c1")
        );

        sessions.finish_turn(&k, ticket.message_id, &TurnOutcome::Completed { text: "x".into() });
        let next = sessions.begin_turn(&k, "again").unwrap().unwrap();
        assert_eq!(next.request.conversation_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_activate_loads_persisted_token() {
        let persistence = Persistence::in_memory();
        persistence
            .session
            .save("conversationId_facebook", "saved")
            .unwrap();
        let sessions = SessionManager::new(persistence, BotRegistry::builtin(), BusyPolicy::Preempt);

        let k = ctx("facebook");
        sessions.activate(&k).unwrap();
        assert_eq!(sessions.active_context(), Some(k.clone()));
        assert_eq!(sessions.continuation_token(&k).as_deref(), Some("saved"));
    }

    /// Session store that records whether the manager's lock was free on each write
    #[derive(Default)]
    struct LockCheckingStore {
        inner: crate::store::MemoryStore,
        manager: std::sync::OnceLock<std::sync::Weak<SessionManager>>,
        lock_free_on_save: Mutex<Vec<bool>>,
    }

    impl KeyValueStore for LockCheckingStore {
        fn load(&self, key: &str) -> std::result::Result<Option<String>, crate::store::StoreError> {
            self.inner.load(key)
        }

        fn save_batch(&self, entries: &[(&str, &str)]) -> std::result::Result<(), crate::store::StoreError> {
            if let Some(manager) = self.manager.get().and_then(std::sync::Weak::upgrade) {
                self.lock_free_on_save.lock().push(manager.state.try_lock().is_some());
            }
            self.inner.save_batch(entries)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), crate::store::StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_token_saved_after_lock_released() {
        let store = Arc::new(LockCheckingStore::default());
        let persistence = Persistence::new(store.clone(), Arc::new(crate::store::MemoryStore::new()));
        let sessions = Arc::new(SessionManager::new(
            persistence,
            BotRegistry::builtin(),
            BusyPolicy::Preempt,
        ));
        store.manager.set(Arc::downgrade(&sessions)).unwrap();

        let k = ctx("facebook");
        let ticket = sessions.begin_turn(&k, "hi").unwrap().unwrap();
        sessions
            .sink(&ticket)
            .apply(TranscriptMutation::SetContinuationToken { token: "c9".into() });

        assert_eq!(*store.lock_free_on_save.lock(), vec![true]);
        assert_eq!(store.load("conversationId_facebook").unwrap().as_deref(), Some("c9"));
        assert_eq!(sessions.continuation_token(&k).as_deref(), Some("c9"));
    }

    #[test]
    fn test_activate_reloads_stored_state_and_keeps_messages() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("x");
        sessions.activate(&k).unwrap();
        let ticket = sessions.begin_turn(&k, "first post").unwrap().unwrap();
        sessions.finish_turn(&k, ticket.message_id, &TurnOutcome::Completed { text: "ok".into() });
        assert_eq!(sessions.continuation_token(&k), None);

        // Another writer updates the stores behind the manager's back
        let persistence = sessions.persistence();
        persistence.session.save("conversationId_x", "fresh").unwrap();
        let mut profile = PromptProfile::new(crate::prompt::PresetFamily::X);
        profile.custom_instructions = "Keep it short.".into();
        prompt::save_profile(persistence.durable.as_ref(), &k, &profile).unwrap();

        sessions.activate(&k).unwrap();
        assert_eq!(sessions.continuation_token(&k).as_deref(), Some("fresh"));
        assert_eq!(sessions.compiled_prompt(&k).as_deref(), Some("Keep it short."));
        assert_eq!(sessions.messages_for(&k).len(), 2);

        persistence.session.remove("conversationId_x").unwrap();
        sessions.activate(&k).unwrap();
        assert_eq!(sessions.continuation_token(&k), None);
        assert_eq!(sessions.messages_for(&k).len(), 2);
    }

    #[test]
    fn test_activate_leaves_running_turn_token_alone() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("x");
        let ticket = sessions.begin_turn(&k, "hi").unwrap().unwrap();
        sessions
            .sink(&ticket)
            .apply(TranscriptMutation::SetContinuationToken { token: "live".into() });
        sessions.persistence().session.remove("conversationId_x").unwrap();

        sessions.activate(&k).unwrap();
        assert_eq!(sessions.continuation_token(&k).as_deref(), Some("live"));
        assert!(sessions.is_busy(&k));
    }

    #[test]
    fn test_reset_is_scoped_to_one_context() {
        let sessions = manager(BusyPolicy::Preempt);
        let a = ctx("x");
        let b = ctx("facebook");
        for k in [&a, &b] {
            let t = sessions.begin_turn(k, "hi").unwrap().unwrap();
            sessions
                .sink(&t)
                .apply(TranscriptMutation::SetContinuationToken { token: format!("tok-{k}") });
            sessions.finish_turn(k, t.message_id, &TurnOutcome::Completed { text: "ok".into() });
        }

        sessions.reset(&a).unwrap();

        assert!(sessions.messages_for(&a).is_empty());
        assert!(sessions.continuation_token(&a).is_none());
        assert!(sessions
            .persistence()
            .session
            .load("conversationId_x")
            .unwrap()
            .is_none());
        assert_eq!(sessions.messages_for(&b).len(), 2);
        assert_eq!(sessions.continuation_token(&b).as_deref(), Some("tok-facebook"));
    }

    #[test]
    fn test_reset_cancels_running_turn() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("x");
        let ticket = sessions.begin_turn(&k, "hi").unwrap().unwrap();
        sessions.reset(&k).unwrap();

        assert!(ticket.cancel.is_cancelled());
        assert!(!sessions.is_busy(&k));
        assert!(sessions.begin_turn(&k, "").unwrap().is_none());
        assert!(sessions.messages_for(&k).is_empty());
    }

    #[test]
    fn test_cancel_keeps_history() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("x");
        let ticket = sessions.begin_turn(&k, "hi").unwrap().unwrap();

        assert!(sessions.cancel(&k));
        assert!(!sessions.cancel(&k));
        assert!(ticket.cancel.is_cancelled());

        let messages = sessions.messages_for(&k);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[test]
    fn test_finish_commits_streaming_flag() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("x");
        let ticket = sessions.begin_turn(&k, "hi").unwrap().unwrap();
        sessions.sink(&ticket).apply(TranscriptMutation::ReplaceContent {
            message_id: ticket.message_id,
            content: "answer".into(),
        });
        sessions.finish_turn(&k, ticket.message_id, &TurnOutcome::Completed { text: "answer".into() });

        let last = sessions.messages_for(&k).pop().unwrap();
        assert_eq!(last.content, "answer");
        assert!(!last.streaming);
        assert!(!sessions.is_busy(&k));
    }

    #[test]
    fn test_switching_context_keeps_other_turn_running() {
        let sessions = manager(BusyPolicy::Preempt);
        let a = ctx("x");
        let b = ctx("facebook");
        sessions.activate(&a).unwrap();
        let ticket = sessions.begin_turn(&a, "hi").unwrap().unwrap();

        sessions.activate(&b).unwrap();
        assert!(!ticket.cancel.is_cancelled());
        assert!(sessions.is_busy(&a));
        assert!(sessions.active_messages().is_empty());

        sessions.activate(&a).unwrap();
        assert_eq!(sessions.active_messages().len(), 2);
    }

    #[test]
    fn test_save_profile_updates_prompt_and_storage() {
        let sessions = manager(BusyPolicy::Preempt);
        let k = ctx("x");
        let mut profile = PromptProfile::default();
        profile.custom_instructions = "Use hashtags.".into();

        let compiled = sessions.save_profile(&k, profile).unwrap();
        assert_eq!(compiled, "Use hashtags.");
        assert_eq!(sessions.compiled_prompt(&k).as_deref(), Some("Use hashtags."));
        assert_eq!(
            sessions.profile(&k).unwrap().preset_family,
            crate::prompt::PresetFamily::X
        );
        assert_eq!(
            sessions
                .persistence()
                .durable
                .load("customPrompt_x")
                .unwrap()
                .as_deref(),
            Some("Use hashtags.")
        );

        let ticket = sessions.begin_turn(&k, "post").unwrap().unwrap();
        assert_eq!(ticket.request.system_prompt.as_deref(), Some("Use hashtags."));
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let sessions = manager(BusyPolicy::Preempt);
        let mut rx = sessions.subscribe();
        let k = ctx("x");
        sessions.begin_turn(&k, "hi").unwrap().unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, TranscriptEvent::MessageAdded { ref message, .. } if message.content == "hi"));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.context(), &k);
    }
}

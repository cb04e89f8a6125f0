//! Stream Consumer Implementation
//!
//! Drives one HTTP exchange to a terminal [`TurnOutcome`], emitting
//! [`TranscriptMutation`]s along the way.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::decoder::FrameDecoder;
use super::events::{Frame, StreamEvent};
use crate::backend::{BackendError, ChatResponse};
use crate::messages::MessageId;

/// Shown when a successful stream produced no answer text
pub const NO_RESPONSE_TEXT: &str = "Could not get a response.";

/// Shown when a turn fails without a server-provided reason
pub const GENERIC_FAILURE_TEXT: &str = "An error occurred. Please try again.";

/// Longest payload preview included in malformed-frame warnings
const PREVIEW_CHARS: usize = 80;

// ============================================================================
// Turn State
// ============================================================================

/// Lifecycle of one streamed turn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    /// Created, request not yet sent
    Idle,
    /// Request sent, waiting for the status line
    Sending,
    /// Reading the body
    Streaming,
    /// Stream ended normally
    Completed,
    /// Stopped by cancellation
    Cancelled,
    /// Rejected, failed, or ended by a server error event
    Errored,
}

impl TurnState {
    /// Whether no further transitions are possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }
}

/// How a turn ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The answer was delivered
    Completed {
        /// Final message content (the fallback text if nothing arrived)
        text: String,
    },
    /// The turn was cancelled and its placeholder removed
    Cancelled,
    /// The turn failed
    Errored {
        /// Text written into the assistant message
        message: String,
    },
}

impl TurnOutcome {
    /// The terminal state this outcome corresponds to
    #[must_use]
    pub fn state(&self) -> TurnState {
        match self {
            Self::Completed { .. } => TurnState::Completed,
            Self::Cancelled => TurnState::Cancelled,
            Self::Errored { .. } => TurnState::Errored,
        }
    }
}

// ============================================================================
// Transcript Mutations
// ============================================================================

/// A change the consumer wants applied to its conversation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptMutation {
    /// Replace the target message's content wholesale
    ReplaceContent {
        /// Target assistant message
        message_id: MessageId,
        /// Full content
        content: String,
    },
    /// Store a continuation token on the owning conversation
    SetContinuationToken {
        /// Server-issued token
        token: String,
    },
    /// Delete the target message
    RemoveMessage {
        /// Target assistant message
        message_id: MessageId,
    },
}

/// Receives transcript mutations as they are produced
///
/// Called synchronously between network reads, so implementations should not
/// block.
pub trait TranscriptSink: Send + Sync {
    /// Apply one mutation
    fn apply(&self, mutation: TranscriptMutation);
}

// ============================================================================
// Consumer
// ============================================================================

/// Consumes one streamed response into a target assistant message
#[derive(Debug)]
pub struct StreamConsumer {
    /// Assistant message being filled
    message_id: MessageId,
    /// Fires on preemption, reset, or explicit cancel
    cancel: CancellationToken,
    /// Current lifecycle state
    state: TurnState,
    /// Answer text received so far
    accumulated: String,
}

impl StreamConsumer {
    /// Create a consumer for a target message
    #[must_use]
    pub fn new(message_id: MessageId, cancel: CancellationToken) -> Self {
        Self {
            message_id,
            cancel,
            state: TurnState::Idle,
            accumulated: String::new(),
        }
    }

    /// Target message id
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Answer text received so far
    #[must_use]
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    /// Record that the request is on the wire
    pub fn mark_sending(&mut self) {
        self.transition(TurnState::Sending);
    }

    /// End the turn as cancelled, removing the target message
    pub fn cancel(mut self, sink: &dyn TranscriptSink) -> TurnOutcome {
        self.transition(TurnState::Cancelled);
        sink.apply(TranscriptMutation::RemoveMessage {
            message_id: self.message_id,
        });
        TurnOutcome::Cancelled
    }

    /// End the turn because the request never produced a response
    pub fn transport_failed(self, error: &BackendError, sink: &dyn TranscriptSink) -> TurnOutcome {
        tracing::warn!(message_id = %self.message_id, error = %error, "Chat request failed");
        self.fail(GENERIC_FAILURE_TEXT.to_string(), sink)
    }

    /// Read the response to a terminal outcome
    ///
    /// A non-success status fails the turn without touching the body.
    /// Cancellation is observed at every await point.
    pub async fn consume(mut self, response: ChatResponse, sink: &dyn TranscriptSink) -> TurnOutcome {
        if !response.is_success() {
            tracing::warn!(
                message_id = %self.message_id,
                status = response.status,
                "Chat request rejected"
            );
            return self.fail(GENERIC_FAILURE_TEXT.to_string(), sink);
        }

        self.transition(TurnState::Streaming);
        let mut body = response.body;
        let mut decoder = FrameDecoder::new();

        loop {
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.cancel(sink),
                chunk = body.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    tracing::warn!(message_id = %self.message_id, error = %e, "Stream read failed");
                    return self.fail(GENERIC_FAILURE_TEXT.to_string(), sink);
                }
                None => break,
            };

            for frame in decoder.feed(&bytes) {
                if let Some(message) = self.handle_frame(frame, sink) {
                    return self.fail(message, sink);
                }
            }
        }

        let leftover = decoder.finish();
        if !leftover.is_empty() {
            tracing::debug!(
                message_id = %self.message_id,
                bytes = leftover.len(),
                "Discarding unterminated final line"
            );
        }

        self.complete(sink)
    }

    /// Apply one frame; returns the failure text if the frame ends the turn
    fn handle_frame(&mut self, frame: Frame, sink: &dyn TranscriptSink) -> Option<String> {
        match frame {
            Frame::Event(StreamEvent::Message { answer, .. }) => {
                if let Some(fragment) = answer.filter(|a| !a.is_empty()) {
                    self.accumulated.push_str(&fragment);
                    sink.apply(TranscriptMutation::ReplaceContent {
                        message_id: self.message_id,
                        content: self.accumulated.clone(),
                    });
                }
                None
            }
            Frame::Event(StreamEvent::MessageEnd { conversation_id }) => {
                match conversation_id.filter(|token| !token.is_empty()) {
                    Some(token) => {
                        tracing::debug!(message_id = %self.message_id, "Received continuation token");
                        sink.apply(TranscriptMutation::SetContinuationToken { token });
                    }
                    None => tracing::debug!(message_id = %self.message_id, "Message end without token"),
                }
                None
            }
            Frame::Event(StreamEvent::Error { message }) => {
                tracing::warn!(
                    message_id = %self.message_id,
                    error = message.as_deref().unwrap_or(""),
                    "Server reported an error"
                );
                Some(
                    message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| GENERIC_FAILURE_TEXT.to_string()),
                )
            }
            Frame::Unknown(kind) => {
                tracing::debug!(message_id = %self.message_id, kind = %kind, "Skipping unknown stream event");
                None
            }
            Frame::Malformed { payload, reason } => {
                tracing::warn!(
                    message_id = %self.message_id,
                    payload = %preview(&payload),
                    reason = %reason,
                    "Skipping malformed stream event"
                );
                None
            }
            Frame::Ignored => None,
        }
    }

    fn complete(mut self, sink: &dyn TranscriptSink) -> TurnOutcome {
        self.transition(TurnState::Completed);
        if self.accumulated.is_empty() {
            sink.apply(TranscriptMutation::ReplaceContent {
                message_id: self.message_id,
                content: NO_RESPONSE_TEXT.to_string(),
            });
            return TurnOutcome::Completed {
                text: NO_RESPONSE_TEXT.to_string(),
            };
        }
        TurnOutcome::Completed {
            text: self.accumulated,
        }
    }

    fn fail(mut self, message: String, sink: &dyn TranscriptSink) -> TurnOutcome {
        self.transition(TurnState::Errored);
        sink.apply(TranscriptMutation::ReplaceContent {
            message_id: self.message_id,
            content: message.clone(),
        });
        TurnOutcome::Errored { message }
    }

    fn transition(&mut self, next: TurnState) {
        debug_assert!(!self.state.is_terminal(), "transition out of terminal state");
        tracing::debug!(message_id = %self.message_id, from = ?self.state, to = ?next, "Turn state change");
        self.state = next;
    }
}

fn preview(payload: &str) -> String {
    if payload.chars().count() <= PREVIEW_CHARS {
        return payload.to_string();
    }
    let mut out: String = payload.chars().take(PREVIEW_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        mutations: Mutex<Vec<TranscriptMutation>>,
    }

    impl RecordingSink {
        fn mutations(&self) -> Vec<TranscriptMutation> {
            self.mutations.lock().clone()
        }

        fn last_content(&self) -> Option<String> {
            self.mutations().into_iter().rev().find_map(|m| match m {
                TranscriptMutation::ReplaceContent { content, .. } => Some(content),
                _ => None,
            })
        }

        fn token(&self) -> Option<String> {
            self.mutations().into_iter().rev().find_map(|m| match m {
                TranscriptMutation::SetContinuationToken { token } => Some(token),
                _ => None,
            })
        }
    }

    impl TranscriptSink for RecordingSink {
        fn apply(&self, mutation: TranscriptMutation) {
            self.mutations.lock().push(mutation);
        }
    }

    fn response(status: u16, chunks: &[&str]) -> ChatResponse {
        let chunks: Vec<Result<Bytes, BackendError>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        ChatResponse {
            status,
            body: Box::pin(futures::stream::iter(chunks)),
        }
    }

    fn consumer() -> StreamConsumer {
        StreamConsumer::new(MessageId::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_fragments_accumulate_and_token_is_set() {
        let sink = RecordingSink::default();
        let outcome = consumer()
            .consume(
                response(
                    200,
                    &[
                        "data: {\"event\":\"message\",\"answer\":\"Hel\"}\n\n",
                        "data: {\"event\":\"message\",\"answer\":\"lo\"}\n\n",
                        "data: {\"event\":\"message_end\",\"conversation_id\":\"c1\"}\n\n",
                    ],
                ),
                &sink,
            )
            .await;

        assert_eq!(outcome, TurnOutcome::Completed { text: "Hello".into() });
        assert_eq!(sink.last_content().as_deref(), Some("Hello"));
        assert_eq!(sink.token().as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_each_fragment_is_a_full_replace() {
        let sink = RecordingSink::default();
        consumer()
            .consume(
                response(
                    200,
                    &["data: {\"event\":\"message\",\"answer\":\"a\"}\ndata: {\"event\":\"message\",\"answer\":\"b\"}\n"],
                ),
                &sink,
            )
            .await;

        let contents: Vec<String> = sink
            .mutations()
            .into_iter()
            .filter_map(|m| match m {
                TranscriptMutation::ReplaceContent { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["a", "ab"]);
    }

    #[tokio::test]
    async fn test_empty_stream_uses_fallback() {
        let sink = RecordingSink::default();
        let outcome = consumer()
            .consume(response(200, &["data: [DONE]\n"]), &sink)
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: NO_RESPONSE_TEXT.into()
            }
        );
        assert_eq!(sink.last_content().as_deref(), Some(NO_RESPONSE_TEXT));
        assert!(sink.token().is_none());
    }

    #[tokio::test]
    async fn test_rejected_status_never_reads_body() {
        let sink = RecordingSink::default();
        let outcome = consumer()
            .consume(
                response(500, &["data: {\"event\":\"message\",\"answer\":\"x\"}\n"]),
                &sink,
            )
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Errored {
                message: GENERIC_FAILURE_TEXT.into()
            }
        );
        assert_eq!(sink.mutations().len(), 1);
        assert_eq!(sink.last_content().as_deref(), Some(GENERIC_FAILURE_TEXT));
    }

    #[tokio::test]
    async fn test_error_event_stops_reading() {
        let sink = RecordingSink::default();
        let outcome = consumer()
            .consume(
                response(
                    200,
                    &[
                        "data: {\"event\":\"message\",\"answer\":\"partial\"}\n",
                        "data: {\"event\":\"error\",\"message\":\"quota exceeded\"}\n",
                        "data: {\"event\":\"message\",\"answer\":\" more\"}\n",
                    ],
                ),
                &sink,
            )
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Errored {
                message: "quota exceeded".into()
            }
        );
        assert_eq!(sink.last_content().as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_error_event_without_message_uses_generic_text() {
        let sink = RecordingSink::default();
        let outcome = consumer()
            .consume(response(200, &["data: {\"event\":\"error\"}\n"]), &sink)
            .await;

        assert_eq!(outcome.state(), TurnState::Errored);
        assert_eq!(sink.last_content().as_deref(), Some(GENERIC_FAILURE_TEXT));
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let sink = RecordingSink::default();
        let outcome = consumer()
            .consume(
                response(
                    200,
                    &[
                        "data: {oops\n",
                        "data: {\"event\":\"surprise\"}\n",
                        "data: {\"event\":\"message\",\"answer\":\"fine\"}\n",
                    ],
                ),
                &sink,
            )
            .await;

        assert_eq!(outcome, TurnOutcome::Completed { text: "fine".into() });
    }

    #[tokio::test]
    async fn test_empty_token_is_not_stored() {
        let sink = RecordingSink::default();
        consumer()
            .consume(
                response(
                    200,
                    &["data: {\"event\":\"message_end\",\"conversation_id\":\"\"}\n"],
                ),
                &sink,
            )
            .await;
        assert!(sink.token().is_none());
    }

    #[tokio::test]
    async fn test_body_error_is_generic_failure() {
        let sink = RecordingSink::default();
        let chunks: Vec<Result<Bytes, BackendError>> = vec![
            Ok(Bytes::from_static(b"data: {\"event\":\"message\",\"answer\":\"x\"}\n")),
            Err(BackendError::Body("connection reset".into())),
        ];
        let outcome = consumer()
            .consume(
                ChatResponse {
                    status: 200,
                    body: Box::pin(futures::stream::iter(chunks)),
                },
                &sink,
            )
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Errored {
                message: GENERIC_FAILURE_TEXT.into()
            }
        );
    }

    #[tokio::test]
    async fn test_cancellation_mid_stream_removes_message() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, BackendError>>();
        let cancel = CancellationToken::new();
        let id = MessageId::new();
        let consumer = StreamConsumer::new(id, cancel.clone());
        let sink = std::sync::Arc::new(RecordingSink::default());

        let task_sink = sink.clone();
        let task = tokio::spawn(async move {
            consumer
                .consume(
                    ChatResponse {
                        status: 200,
                        body: Box::pin(rx),
                    },
                    task_sink.as_ref(),
                )
                .await
        });

        tx.unbounded_send(Ok(Bytes::from_static(
            b"data: {\"event\":\"message\",\"answer\":\"half\"}\n",
        )))
        .unwrap();
        // Wait until the first fragment has been applied
        while sink.mutations().is_empty() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        assert_eq!(task.await.unwrap(), TurnOutcome::Cancelled);
        assert_eq!(
            sink.mutations().last(),
            Some(&TranscriptMutation::RemoveMessage { message_id: id })
        );
        assert!(sink.token().is_none());
        drop(tx);
    }

    #[tokio::test]
    async fn test_already_cancelled_turn_reads_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sink = RecordingSink::default();
        let outcome = StreamConsumer::new(MessageId::new(), cancel)
            .consume(
                response(200, &["data: {\"event\":\"message\",\"answer\":\"x\"}\n"]),
                &sink,
            )
            .await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(sink.mutations().len(), 1);
    }

    #[test]
    fn test_consume_waits_on_open_body() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, BackendError>>();
        let sink = RecordingSink::default();
        let mut task = tokio_test::task::spawn(consumer().consume(
            ChatResponse {
                status: 200,
                body: Box::pin(rx),
            },
            &sink,
        ));

        tokio_test::assert_pending!(task.poll());

        tx.unbounded_send(Ok(Bytes::from_static(
            b"data: {\"event\":\"message\",\"answer\":\"hi\"}\n",
        )))
        .unwrap();
        tokio_test::assert_pending!(task.poll());
        assert_eq!(sink.last_content().as_deref(), Some("hi"));

        drop(tx);
        let outcome = tokio_test::assert_ready!(task.poll());
        assert_eq!(outcome, TurnOutcome::Completed { text: "hi".into() });
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 1);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TurnState::Idle.is_terminal());
        assert!(!TurnState::Streaming.is_terminal());
        assert!(TurnState::Cancelled.is_terminal());
        assert_eq!(TurnOutcome::Cancelled.state(), TurnState::Cancelled);
    }
}

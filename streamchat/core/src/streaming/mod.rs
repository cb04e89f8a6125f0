//! Streaming Response Consumer
//!
//! Turns one HTTP exchange into an ordered sequence of transcript mutations
//! and exactly one terminal outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        StreamConsumer                             │
//! │                                                                   │
//! │   ByteStream ──► Utf8Decoder ──► LineBuffer ──► parse_line()      │
//! │   (any chunking)  (carries split   (holds partial   (closed event │
//! │                    code points)     last line)       union)       │
//! │                                                        │          │
//! │                                                        ▼          │
//! │                        TranscriptSink::apply(TranscriptMutation)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Sending ──► Streaming ──┬──► Completed
//!             │            │       ├──► Errored
//!             └────────────┴───────┴──► Cancelled
//! ```
//!
//! # Features
//!
//! - **Chunking invariance**: the same bytes produce the same frames however
//!   the network split them
//! - **Non-fatal parse failures**: malformed and unknown events are logged and
//!   skipped
//! - **Cooperative cancellation**: observed at every read, biased ahead of data
//!
//! # Example
//!
//! ```ignore
//! use streamchat_core::streaming::StreamConsumer;
//!
//! let consumer = StreamConsumer::new(message_id, cancel.clone());
//! let outcome = consumer.consume(response, &sink).await;
//! ```

mod consumer;
mod decoder;
mod events;

pub use consumer::{
    StreamConsumer, TranscriptMutation, TranscriptSink, TurnOutcome, TurnState,
    GENERIC_FAILURE_TEXT, NO_RESPONSE_TEXT,
};
pub use decoder::{FrameDecoder, LineBuffer, Utf8Decoder};
pub use events::{parse_line, Frame, StreamEvent, DATA_PREFIX, DONE_SENTINEL};

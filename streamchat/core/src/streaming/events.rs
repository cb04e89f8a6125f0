//! Stream event frames
//!
//! One `data: ` line carries one JSON payload. The payload is a closed tagged
//! union on its `event` field; anything outside that union is a distinct,
//! non-fatal frame kind rather than an error.

use serde::Deserialize;

/// Line prefix marking a stream event
pub const DATA_PREFIX: &str = "data: ";

/// Payload that signals the end of the stream (ignored)
pub const DONE_SENTINEL: &str = "[DONE]";

/// A recognized stream event
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of the answer
    Message {
        /// Text to append
        #[serde(default)]
        answer: Option<String>,
        /// Continuation token echoed on fragments (not used; `message_end` is authoritative)
        #[serde(default)]
        conversation_id: Option<String>,
    },
    /// The answer is complete
    MessageEnd {
        /// Continuation token for the next turn
        #[serde(default)]
        conversation_id: Option<String>,
    },
    /// The server gave up on this turn
    Error {
        /// Human-readable reason
        #[serde(default)]
        message: Option<String>,
    },
}

/// Result of decoding one line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Not a data line, an empty payload, or the done sentinel
    Ignored,
    /// A recognized event
    Event(StreamEvent),
    /// Valid JSON with an `event` value this client does not know
    Unknown(String),
    /// Payload was not a JSON object with an `event` field
    Malformed {
        /// The payload that failed to parse
        payload: String,
        /// Parser message
        reason: String,
    },
}

/// Decode one complete line into a frame
///
/// A trailing `\r` is dropped before the prefix is checked.
#[must_use]
pub fn parse_line(line: &str) -> Frame {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    if payload.is_empty() || payload == DONE_SENTINEL {
        return Frame::Ignored;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => return malformed(payload, e.to_string()),
    };
    let Some(kind) = value.get("event").and_then(serde_json::Value::as_str) else {
        return malformed(payload, "missing \"event\" field".to_string());
    };
    if !matches!(kind, "message" | "message_end" | "error") {
        return Frame::Unknown(kind.to_string());
    }

    match serde_json::from_value::<StreamEvent>(value) {
        Ok(event) => Frame::Event(event),
        Err(e) => malformed(payload, e.to_string()),
    }
}

fn malformed(payload: &str, reason: String) -> Frame {
    Frame::Malformed {
        payload: payload.to_string(),
        reason,
    }
}

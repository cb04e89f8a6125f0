//! Incremental frame decoding
//!
//! Network chunks arrive at arbitrary byte boundaries. [`Utf8Decoder`] carries
//! an incomplete multi-byte sequence over to the next chunk, and
//! [`LineBuffer`] holds the trailing partial line until its newline arrives.
//! Together they make decoding independent of how the stream was chunked.

use super::events::{parse_line, Frame};

/// Longest possible UTF-8 sequence
const MAX_UTF8_LEN: usize = 4;

/// Streaming UTF-8 decoder
///
/// Invalid sequences become U+FFFD; incomplete trailing sequences are held
/// until more bytes arrive.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with no carried state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning all text that is complete so far
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream; a dangling partial sequence becomes U+FFFD
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        debug_assert!(self.pending.len() < MAX_UTF8_LEN);
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }

    /// Whether bytes are being held for the next chunk
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Splits decoded text into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every line it completed, without the newline
    pub fn push(&mut self, text: &str) -> Vec<String> {
        // Only the new text can hold a newline; the buffer never does
        let Some(last_newline) = text.rfind('\n') else {
            self.buffer.push_str(text);
            return Vec::new();
        };

        let offset = self.buffer.len();
        self.buffer.push_str(text);
        let remainder = self.buffer.split_off(offset + last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, remainder);
        complete
            .strip_suffix('\n')
            .unwrap_or(&complete)
            .split('\n')
            .map(str::to_string)
            .collect()
    }

    /// The unterminated fragment held so far
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Drop the unterminated fragment, returning it
    pub fn take_pending(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Bytes in, frames out
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    lines: LineBuffer,
}

impl FrameDecoder {
    /// Create a decoder with empty buffers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning the frames of every completed line
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let text = self.utf8.decode(chunk);
        self.lines
            .push(&text)
            .iter()
            .map(|line| parse_line(line))
            .filter(|frame| *frame != Frame::Ignored)
            .collect()
    }

    /// End of stream: discard whatever was never terminated by a newline
    ///
    /// Returns the discarded fragment so the caller can log it.
    pub fn finish(&mut self) -> String {
        let mut leftover = self.lines.take_pending();
        leftover.push_str(&self.utf8.finish());
        leftover
    }
}

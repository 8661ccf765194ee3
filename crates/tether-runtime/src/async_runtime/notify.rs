//! Notification framing on the channel transport
//!
//! Each pushed callback is announced by writing its handle as decimal text
//! followed by a newline. The runtime may deliver the stream in arbitrary
//! chunks, so the decoder buffers an incomplete trailing line until the rest
//! arrives.

use crate::ffi::callbacks::CallbackHandle;
use tracing::warn;

/// Longest line worth buffering; a handle needs at most 20 digits
const MAX_LINE_BYTES: usize = 64;

/// Wire form of one notification
pub fn encode(handle: CallbackHandle) -> String {
    format!("{}\n", handle)
}

/// Incremental decoder for the notification stream
#[derive(Debug, Default)]
pub struct NotificationDecoder {
    partial: Vec<u8>,
    /// Dropping the rest of an oversized line
    skipping: bool,
}

impl NotificationDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every handle completed by it, in stream order
    ///
    /// Blank lines are ignored and malformed tokens are logged and skipped.
    /// A line that grows past `MAX_LINE_BYTES` without a terminator is
    /// discarded up to its newline.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<CallbackHandle> {
        let mut chunk = chunk;
        if self.skipping {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    self.skipping = false;
                    chunk = &chunk[end + 1..];
                }
                None => return Vec::new(),
            }
        }
        self.partial.extend_from_slice(chunk);

        let mut handles = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.partial[consumed..].iter().position(|b| *b == b'\n') {
            let line = &self.partial[consumed..consumed + offset];
            consumed += offset + 1;

            let token = String::from_utf8_lossy(line);
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.parse::<CallbackHandle>() {
                Ok(handle) => handles.push(handle),
                Err(_) => warn!(token, "skipping malformed notification"),
            }
        }
        self.partial.drain(..consumed);

        if self.partial.len() > MAX_LINE_BYTES {
            warn!(bytes = self.partial.len(), "discarding oversized notification");
            self.partial.clear();
            self.skipping = true;
        }
        handles
    }

    /// Bytes held back waiting for a line terminator
    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }
}

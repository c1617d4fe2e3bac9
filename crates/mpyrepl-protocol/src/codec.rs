//! Sentinel matching and submission framing.
//!
//! The raw REPL never announces how long a reply is. The host reads one byte
//! at a time and stops as soon as the bytes received so far end with the
//! sentinel it is waiting for. [`SentinelMatcher`] holds that accumulator.

use bytes::{BufMut, BytesMut};

use crate::constants::CTRL_D;
use crate::error::{ProtocolError, ProtocolResult};

/// Initial accumulator capacity; most replies are short.
const INITIAL_CAPACITY: usize = 256;

/// Accumulates bytes until they end with a fixed sentinel.
///
/// - Bytes are appended one at a time with [`push`](Self::push)
/// - When the accumulator ends with the sentinel, the prefix is returned and
///   the accumulator is reset
/// - An empty prefix is a valid match (e.g. a program with no output)
#[derive(Debug)]
pub struct SentinelMatcher {
    /// The suffix being waited for.
    sentinel: Vec<u8>,
    /// Bytes received since the last match.
    buffer: BytesMut,
}

impl SentinelMatcher {
    /// Create a matcher for the given sentinel.
    pub fn new(sentinel: impl AsRef<[u8]>) -> Self {
        SentinelMatcher {
            sentinel: sentinel.as_ref().to_vec(),
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append one byte.
    ///
    /// Returns `Some(prefix)` with the sentinel stripped once the accumulated
    /// bytes end with the sentinel, or `None` if more data is needed.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        self.buffer.put_u8(byte);
        if !self.buffer.ends_with(&self.sentinel) {
            return None;
        }
        let prefix_len = self.buffer.len() - self.sentinel.len();
        let mut frame = self.buffer.split();
        frame.truncate(prefix_len);
        Some(frame.to_vec())
    }
}

/// Frame a code submission: the source bytes followed by `Ctrl-D`.
///
/// Code that already contains `Ctrl-D` would end the submission early, so it
/// is rejected.
pub fn encode_submission(code: &str) -> ProtocolResult<Vec<u8>> {
    if let Some(offset) = code.bytes().position(|b| b == CTRL_D) {
        return Err(ProtocolError::EmbeddedTerminator { offset });
    }
    let mut frame = Vec::with_capacity(code.len() + 1);
    frame.extend_from_slice(code.as_bytes());
    frame.push(CTRL_D);
    Ok(frame)
}

/// Decode device text. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

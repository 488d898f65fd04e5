//! In-memory record of input forwarded to the remote shell.

use bytes::{Bytes, BytesMut};

/// Input bytes forwarded to the remote shell, in order.
///
/// Only writes the remote shell accepted are recorded. Lost when the bridge
/// outcome is dropped.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    input: BytesMut,
    writes: usize,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one forwarded write.
    pub fn record(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
        self.writes += 1;
    }

    /// Number of recorded writes.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }

    /// Total recorded bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.input.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.input
    }

    /// Recorded input as text, replacing invalid UTF-8.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.input).into_owned()
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.input.freeze()
    }
}

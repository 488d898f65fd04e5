//! Output buffer shared between the remote session and the flusher.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};

/// Receiver of remote output, called synchronously from the session's own
/// delivery context.
pub trait OutputSink: Send + Sync {
    /// Accept a chunk of remote output.
    fn write_output(&self, data: &[u8]);
}

/// Accumulates remote output between flush ticks.
///
/// The producer (remote session) appends; the consumer (output flusher)
/// takes the whole buffer once per tick. Writes landing between two ticks
/// therefore leave as a single frame.
#[derive(Debug, Default)]
pub struct OutputAggregator {
    buffer: Mutex<BytesMut>,
}

impl OutputAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append remote output. Never waits on the consumer.
    pub fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.lock().extend_from_slice(data);
    }

    /// Take everything buffered so far, leaving the buffer empty.
    ///
    /// Returns `None` when nothing was written since the last drain.
    #[must_use]
    pub fn drain_if_non_empty(&self) -> Option<Bytes> {
        let mut buffer = self.lock();
        if buffer.is_empty() {
            None
        } else {
            Some(buffer.split().freeze())
        }
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        // Poison is ignored: appends and takes never leave the buffer half-updated.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSink for OutputAggregator {
    fn write_output(&self, data: &[u8]) {
        self.write(data);
    }
}

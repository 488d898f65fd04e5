//! Wire protocol between the browser terminal and the bridge.
//!
//! Inbound: `{"type": "cmd" | "resize", "data": string, "cols": int, "rows": int}`.
//! Outbound: `{"type": "cmd", "data": string}`.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

const COMMAND_TYPE: &str = "cmd";
const RESIZE_TYPE: &str = "resize";

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed control message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Kind of an inbound control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum MessageKind {
    /// Raw terminal input for the remote stdin.
    #[serde(rename = "cmd")]
    Command,
    /// New terminal dimensions.
    #[serde(rename = "resize")]
    ResizePty,
    /// Anything else; ignored.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Message from the browser terminal.
///
/// Browser clients reuse one object for every message, so fields that do not
/// belong to the message kind are commonly present, stale or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cols: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: i64,
}

/// What the bridge should do with a control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Forward these bytes to the remote stdin.
    Input(Vec<u8>),
    /// Change the remote pseudo-terminal size.
    Resize { cols: u32, rows: u32 },
    /// Nothing to do.
    Ignore,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl ControlMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    /// Returns error if the frame is not a JSON object of the expected shape.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Build a command message.
    #[must_use]
    pub fn command(data: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Command,
            data: data.into(),
            cols: 0,
            rows: 0,
        }
    }

    /// Build a resize message.
    #[must_use]
    pub const fn resize(cols: i64, rows: i64) -> Self {
        Self {
            kind: MessageKind::ResizePty,
            data: String::new(),
            cols,
            rows,
        }
    }

    /// Dimensions carried by a resize message, if both are positive.
    #[must_use]
    pub fn resize_dimensions(&self) -> Option<(u32, u32)> {
        let cols = u32::try_from(self.cols).ok().filter(|c| *c > 0)?;
        let rows = u32::try_from(self.rows).ok().filter(|r| *r > 0)?;
        Some((cols, rows))
    }

    /// Decide what to do with this message.
    #[must_use]
    pub fn into_action(self) -> ControlAction {
        match self.kind {
            MessageKind::Command => ControlAction::Input(self.data.into_bytes()),
            MessageKind::ResizePty => self
                .resize_dimensions()
                .map_or(ControlAction::Ignore, |(cols, rows)| ControlAction::Resize { cols, rows }),
            MessageKind::Unknown => ControlAction::Ignore,
        }
    }

    /// Encode as the JSON a browser client would send.
    #[must_use]
    pub fn to_json(&self) -> String {
        let kind = match self.kind {
            MessageKind::Command => COMMAND_TYPE,
            MessageKind::ResizePty => RESIZE_TYPE,
            MessageKind::Unknown => "",
        };
        serde_json::json!({
            "type": kind,
            "data": self.data,
            "cols": self.cols,
            "rows": self.rows,
        })
        .to_string()
    }
}

/// Message from the bridge to the browser terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl OutputFrame {
    /// Wrap terminal output.
    #[must_use]
    pub fn command(data: impl Into<String>) -> Self {
        Self {
            kind: COMMAND_TYPE.to_string(),
            data: data.into(),
        }
    }

    /// Encode as a text frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Turns output chunks into strings without splitting UTF-8 sequences.
///
/// An incomplete sequence at the end of a chunk is held back and prefixed to
/// the next one. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with nothing held back.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, returning `None` if nothing is complete yet.
    pub fn decode(&mut self, chunk: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(chunk);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        if complete == 0 {
            return None;
        }
        let tail = self.pending.split_off(complete);
        let head = std::mem::replace(&mut self.pending, tail);
        Some(match String::from_utf8(head) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Bytes held back waiting for the rest of a sequence.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Flush held-back bytes at end of stream, replacing them with U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&pending).into_owned())
    }
}

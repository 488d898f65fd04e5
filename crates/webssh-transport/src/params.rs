//! PTY size negotiation on the WebSocket request.

use serde::Deserialize;
use webssh_core::config::{DEFAULT_PTY_HEIGHT, DEFAULT_PTY_WIDTH};

/// Initial remote terminal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u32,
    pub rows: u32,
}

impl Default for PtySize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_PTY_WIDTH,
            rows: DEFAULT_PTY_HEIGHT,
        }
    }
}

/// Raw `ptyWidth`/`ptyHeight` query parameters.
///
/// Kept as strings so a bad value falls back to the default size instead of
/// rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PtyQuery {
    #[serde(rename = "ptyWidth")]
    pub pty_width: Option<String>,
    #[serde(rename = "ptyHeight")]
    pub pty_height: Option<String>,
}

impl PtyQuery {
    /// Requested size, or the default when either dimension is absent,
    /// unparsable or zero.
    #[must_use]
    pub fn size(&self) -> PtySize {
        let cols = parse_dimension(self.pty_width.as_deref());
        let rows = parse_dimension(self.pty_height.as_deref());
        match (cols, rows) {
            (Some(cols), Some(rows)) => PtySize { cols, rows },
            _ => PtySize::default(),
        }
    }
}

fn parse_dimension(value: Option<&str>) -> Option<u32> {
    value?.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

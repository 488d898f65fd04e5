//! Transport layer for browser terminals.
//!
//! Provides:
//! - PTY size query parameters
//! - Remote session connector seam
//! - WebSocket transport (feature: websocket)

pub mod connector;
pub mod params;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use connector::SessionConnector;
pub use params::{PtyQuery, PtySize};

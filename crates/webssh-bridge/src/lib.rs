//! Bridge controller relaying a browser transport to a remote shell.
//!
//! Provides:
//! - `Bridge` - Runs input relay, output flusher and exit watcher for one
//!   connection and releases both ends exactly once
//! - `BridgeRegistry` - Live bridges of a process, for shutdown
//! - `Transcript` - In-memory record of forwarded input

pub mod config;
pub mod controller;
mod flusher;
pub mod registry;
mod relay;
pub mod transcript;
mod watcher;

#[cfg(test)]
mod test_support;

pub use config::BridgeConfig;
pub use controller::{Bridge, BridgeOutcome, BridgeState};
pub use registry::BridgeRegistry;
pub use transcript::Transcript;

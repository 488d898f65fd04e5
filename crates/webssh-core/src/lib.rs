//! Core abstractions for bridging a browser terminal to a remote shell.
//!
//! This crate provides the fundamental building blocks:
//! - `OutputAggregator` - Coalesces remote output between flush ticks
//! - `TerminationSignal` - Single-fire shutdown latch shared by bridge tasks
//! - `ControlMessage` / `OutputFrame` - JSON wire protocol
//! - `RemoteSessionConfig` - Connection parameters for the remote shell
//! - Remote shell and transport traits

pub mod aggregator;
pub mod config;
pub mod protocol;
pub mod signal;
pub mod traits;

pub use aggregator::{OutputAggregator, OutputSink};
pub use config::{AuthMode, ConfigError, RemoteSessionConfig};
pub use protocol::{ControlAction, ControlMessage, OutputFrame, ProtocolError, Utf8Decoder};
pub use signal::{StopReason, TerminationSignal};
pub use traits::{ExitStatus, FrameSink, FrameSource, RemoteShell, SessionError, TransportError};

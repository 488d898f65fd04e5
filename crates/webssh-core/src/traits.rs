//! Seams between the bridge, the remote shell and the browser transport.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::{OutputAggregator, protocol::ProtocolError};

/// How a remote shell ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The shell reported an exit code.
    Code(u32),
    /// The shell was killed by a signal.
    Signal(String),
    /// The channel closed without reporting a status.
    ConnectionLost,
}

impl ExitStatus {
    /// Whether the shell exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::ConnectionLost => f.write_str("connection lost"),
        }
    }
}

/// Remote session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Remote session closed")]
    Closed,
    #[error("Remote session timed out after {0:?}")]
    Timeout(Duration),
}

/// A started interactive shell on a remote host.
///
/// Output is not read through this trait: the implementation pushes it into
/// the aggregator returned by [`RemoteShell::output`].
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Forward bytes to the remote stdin.
    async fn write(&self, data: &[u8]) -> Result<(), SessionError>;

    /// Change the remote pseudo-terminal size. Callers filter out zero sizes.
    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SessionError>;

    /// Wait until the remote shell exits or the connection drops.
    async fn wait(&self) -> Result<ExitStatus, SessionError>;

    /// Release the session. Idempotent.
    async fn close(&self);

    /// Buffer receiving remote output.
    fn output(&self) -> &OutputAggregator;
}

#[async_trait]
impl<T: RemoteShell + ?Sized> RemoteShell for Arc<T> {
    async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        (**self).write(data).await
    }

    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SessionError> {
        (**self).resize(cols, rows).await
    }

    async fn wait(&self) -> Result<ExitStatus, SessionError> {
        (**self).wait().await
    }

    async fn close(&self) {
        (**self).close().await;
    }

    fn output(&self) -> &OutputAggregator {
        (**self).output()
    }
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,
    #[error("Transport error: {0}")]
    Io(String),
    #[error("Transport send timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Receiving half of the browser transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame; `None` once the peer has closed the transport.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// Sending half of the browser transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a transport-level liveness ping.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Close the transport.
    async fn close(&mut self) -> Result<(), TransportError>;
}

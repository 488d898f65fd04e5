//! Opening remote sessions for incoming connections.

use async_trait::async_trait;
use webssh_core::RemoteShell;

use crate::params::PtySize;

/// Opens one remote shell per browser connection.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    type Session: RemoteShell + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect and start a shell with the given terminal size.
    async fn connect(&self, size: PtySize) -> Result<Self::Session, Self::Error>;
}

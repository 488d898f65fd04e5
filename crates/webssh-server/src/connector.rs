//! SSH sessions for incoming browser connections.

use async_trait::async_trait;
use webssh_core::RemoteSessionConfig;
use webssh_ssh::{ConnectError, SshSession};
use webssh_transport::{PtySize, SessionConnector};

/// Opens a shell on the configured remote host for each connection.
pub struct SshConnector {
    config: RemoteSessionConfig,
}

impl SshConnector {
    #[must_use]
    pub const fn new(config: RemoteSessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    type Session = SshSession;
    type Error = ConnectError;

    async fn connect(&self, size: PtySize) -> Result<SshSession, ConnectError> {
        let config = self.config.clone().with_term_size(size.cols, size.rows);
        let session = webssh_ssh::connect(&config).await?;
        tracing::debug!(peer = %session.peer_addr(), user = %config.user, "Session handed to bridge");
        Ok(session)
    }
}

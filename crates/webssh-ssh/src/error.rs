use std::{net::SocketAddr, time::Duration};

use thiserror::Error;
use webssh_core::ConfigError;

/// Error opening a remote shell.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Unable to parse private key: {0}")]
    Key(String),
    #[error("Authentication failed for user {user}")]
    Auth { user: String },
    #[error("Failed to connect to {addr}: {source}")]
    Network {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Connecting to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
    #[error("Remote host authentication error: dialed {dialed}, answered by {peer}")]
    HostRejected { dialed: SocketAddr, peer: SocketAddr },
    #[error("SSH protocol error: {0}")]
    Protocol(String),
}

impl ConnectError {
    /// Whether the failure was about credentials rather than reachability.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Key(_) | Self::HostRejected { .. })
    }
}

//! Remote host identity check.

use std::{net::SocketAddr, sync::Arc};

use russh::{client, keys::PublicKey};

/// What is known about the host at key-exchange time.
#[derive(Debug, Clone, Copy)]
pub struct HostIdentity<'a> {
    /// Configured `host:port` the client was asked to reach.
    pub requested: &'a str,
    /// Address the client dialed.
    pub dialed: SocketAddr,
    /// Address that actually answered.
    pub peer: SocketAddr,
    /// Host key presented by the server.
    pub key: &'a PublicKey,
}

/// Pass/fail decision on the remote host.
pub trait HostVerifier: Send + Sync {
    /// Return `true` to continue the handshake.
    fn verify(&self, host: &HostIdentity<'_>) -> bool;
}

impl<F> HostVerifier for F
where
    F: Fn(&HostIdentity<'_>) -> bool + Send + Sync,
{
    fn verify(&self, host: &HostIdentity<'_>) -> bool {
        self(host)
    }
}

/// Accepts the host only if the answering address is the requested one.
///
/// A requested host name cannot be compared directly, so the peer is checked
/// against the address the name resolved to.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchDialedAddress;

impl HostVerifier for MatchDialedAddress {
    fn verify(&self, host: &HostIdentity<'_>) -> bool {
        match host.requested.parse::<SocketAddr>() {
            Ok(requested) => requested == host.peer,
            Err(_) => host.dialed == host.peer,
        }
    }
}

/// russh client handler delegating the host key decision to a verifier.
pub(crate) struct ClientHandler {
    requested: String,
    dialed: SocketAddr,
    peer: SocketAddr,
    verifier: Arc<dyn HostVerifier>,
}

impl ClientHandler {
    pub(crate) fn new(
        requested: impl Into<String>,
        dialed: SocketAddr,
        peer: SocketAddr,
        verifier: Arc<dyn HostVerifier>,
    ) -> Self {
        Self {
            requested: requested.into(),
            dialed,
            peer,
            verifier,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let identity = HostIdentity {
            requested: &self.requested,
            dialed: self.dialed,
            peer: self.peer,
            key: server_public_key,
        };
        let accepted = self.verifier.verify(&identity);
        if accepted {
            tracing::debug!(peer = %self.peer, "Remote host accepted");
        } else {
            tracing::warn!(
                requested = %self.requested,
                dialed = %self.dialed,
                peer = %self.peer,
                "Remote host authentication error"
            );
        }
        Ok(accepted)
    }
}

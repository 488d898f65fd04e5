//! SSH-backed remote shell sessions.
//!
//! Provides:
//! - `connect` / `connect_with` - Dial, authenticate and start a PTY shell
//! - `SshSession` - `RemoteShell` implementation over a russh channel
//! - `HostVerifier` - Pass/fail callback for the remote host identity

mod error;
pub mod session;
pub mod verify;

pub use error::ConnectError;
pub use session::{SshSession, connect, connect_with};
pub use verify::{HostIdentity, HostVerifier, MatchDialedAddress};

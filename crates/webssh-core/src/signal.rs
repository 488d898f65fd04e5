//! Shared shutdown latch for the tasks of one bridge.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use tokio_util::sync::CancellationToken;

/// Why a bridge stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The remote shell exited or the SSH connection dropped.
    RemoteExited,
    /// The browser closed the transport.
    TransportClosed,
    /// Reading from the transport failed.
    TransportFailed(String),
    /// The browser sent a frame that is not a control message.
    MalformedInput(String),
    /// Forwarding input to the remote shell failed.
    RemoteWriteFailed(String),
    /// Sending output or a keepalive to the browser failed.
    SendFailed(String),
    /// The host asked the bridge to stop.
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteExited => f.write_str("remote session ended"),
            Self::TransportClosed => f.write_str("transport closed by client"),
            Self::TransportFailed(e) => write!(f, "transport read failed: {e}"),
            Self::MalformedInput(e) => write!(f, "malformed input: {e}"),
            Self::RemoteWriteFailed(e) => write!(f, "remote write failed: {e}"),
            Self::SendFailed(e) => write!(f, "send to client failed: {e}"),
            Self::Shutdown => f.write_str("shutdown requested"),
        }
    }
}

/// Single-fire, multi-observer termination flag.
///
/// Any task may raise it any number of times; only the first reason is kept.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl TerminationSignal {
    /// Create a signal that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination.
    ///
    /// Returns `true` if this call was the first to raise the signal.
    pub fn raise(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Whether termination has been requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once termination has been requested.
    pub async fn raised(&self) {
        self.token.cancelled().await;
    }

    /// The reason given by the first raise.
    #[must_use]
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().cloned()
    }

    /// Run `op` unless termination is requested first.
    ///
    /// Returns `None`, dropping `op`, once the signal is raised.
    pub async fn unless_raised<F: Future>(&self, op: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.raised() => None,
            output = op => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let signal = TerminationSignal::new();
        assert!(!signal.is_raised());
        assert!(signal.reason().is_none());

        assert!(signal.raise(StopReason::RemoteExited));
        assert!(!signal.raise(StopReason::TransportClosed));
        assert!(!signal.clone().raise(StopReason::Shutdown));

        assert!(signal.is_raised());
        assert_eq!(signal.reason(), Some(StopReason::RemoteExited));
    }

    #[tokio::test]
    async fn test_all_observers_wake() {
        let signal = TerminationSignal::new();
        let observers: Vec<_> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.raised().await })
            })
            .collect();

        signal.raise(StopReason::SendFailed("broken pipe".into()));

        for observer in observers {
            tokio::time::timeout(Duration::from_secs(1), observer)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_raised_resolves_immediately_after_raise() {
        let signal = TerminationSignal::new();
        signal.raise(StopReason::Shutdown);
        tokio_test::assert_ready!(tokio_test::task::spawn(signal.raised()).poll());
    }

    #[tokio::test]
    async fn test_unless_raised() {
        let signal = TerminationSignal::new();
        assert_eq!(signal.unless_raised(async { 7 }).await, Some(7));

        let pending = std::future::pending::<()>();
        let mut stalled = tokio_test::task::spawn(signal.unless_raised(pending));
        tokio_test::assert_pending!(stalled.poll());
        signal.raise(StopReason::RemoteExited);
        assert!(stalled.is_woken());
        assert_eq!(tokio_test::assert_ready!(stalled.poll()), None);

        assert_eq!(signal.unless_raised(async { 7 }).await, None);
    }

    #[test]
    fn test_display() {
        let reason = StopReason::MalformedInput("expected value at line 1".into());
        assert_eq!(reason.to_string(), "malformed input: expected value at line 1");
    }
}

//! Remote exit detection.

use webssh_core::{ExitStatus, RemoteShell, StopReason, TerminationSignal};

/// Wait for the remote shell to end and raise the signal when it does.
///
/// Returns the exit status, or `None` if the bridge stopped first.
pub(crate) async fn run<S>(session: &S, signal: &TerminationSignal) -> Option<ExitStatus>
where
    S: RemoteShell + ?Sized,
{
    let waited = tokio::select! {
        biased;
        () = signal.raised() => return None,
        waited = session.wait() => waited,
    };

    let status = match waited {
        Ok(status) => status,
        Err(e) => {
            tracing::debug!(error = %e, "Lost remote session");
            ExitStatus::ConnectionLost
        }
    };
    tracing::info!(status = %status, "Remote session ended");
    signal.raise(StopReason::RemoteExited);
    Some(status)
}

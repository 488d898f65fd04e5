//! Client-to-remote direction.

use std::time::Duration;

use tokio::time;
use webssh_core::{
    ControlAction, ControlMessage, FrameSource, RemoteShell, SessionError, StopReason,
    TerminationSignal,
};

use crate::transcript::Transcript;

/// Forward control messages from the transport to the remote shell until the
/// signal is raised.
///
/// Raises the signal when the transport closes or fails, when a frame is not
/// a control message, or when a remote write fails. Resize failures are
/// logged and ignored. A write or resize in flight is abandoned once the
/// signal is raised.
pub(crate) async fn run<S, R>(
    session: &S,
    source: &mut R,
    transcript: &mut Transcript,
    signal: &TerminationSignal,
    write_timeout: Duration,
) where
    S: RemoteShell + ?Sized,
    R: FrameSource + ?Sized,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = signal.raised() => return,
            frame = source.next_frame() => frame,
        };

        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Transport read failed");
                signal.raise(StopReason::TransportFailed(e.to_string()));
                return;
            }
            None => {
                tracing::debug!("Transport closed by client");
                signal.raise(StopReason::TransportClosed);
                return;
            }
        };

        let message = match ControlMessage::parse(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed control message");
                signal.raise(StopReason::MalformedInput(e.to_string()));
                return;
            }
        };

        match message.into_action() {
            ControlAction::Input(data) => {
                let written = bounded(write_timeout, session.write(&data));
                match signal.unless_raised(written).await {
                    None => return,
                    Some(Ok(())) => transcript.record(&data),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Failed to write to remote shell");
                        signal.raise(StopReason::RemoteWriteFailed(e.to_string()));
                        return;
                    }
                }
            }
            ControlAction::Resize { cols, rows } => {
                let resized = bounded(write_timeout, session.resize(cols, rows));
                match signal.unless_raised(resized).await {
                    None => return,
                    Some(Ok(())) => tracing::debug!(cols, rows, "Remote PTY resized"),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, cols, rows, "Failed to resize remote PTY");
                    }
                }
            }
            ControlAction::Ignore => tracing::trace!("Ignoring control message"),
        }
    }
}

async fn bounded<F>(limit: Duration, op: F) -> Result<(), SessionError>
where
    F: Future<Output = Result<(), SessionError>>,
{
    time::timeout(limit, op)
        .await
        .unwrap_or(Err(SessionError::Timeout(limit)))
}

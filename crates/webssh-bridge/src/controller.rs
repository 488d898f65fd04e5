//! Bridge lifecycle for one browser connection.

use tokio::{sync::watch, time};
use tracing::Instrument;
use uuid::Uuid;
use webssh_core::{ExitStatus, FrameSink, FrameSource, RemoteShell, StopReason, TerminationSignal};

use crate::{config::BridgeConfig, flusher, relay, transcript::Transcript, watcher};

/// Lifecycle of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Created, not yet running.
    Starting,
    /// Relaying in both directions.
    Running,
    /// Termination requested, tasks winding down.
    Draining,
    /// Both ends released.
    Closed,
}

/// What a finished bridge reports.
#[derive(Debug, Clone)]
pub struct BridgeOutcome {
    pub id: Uuid,
    /// First reason given for stopping.
    pub reason: StopReason,
    /// Remote exit status, if the remote side ended first.
    pub exit_status: Option<ExitStatus>,
    pub transcript: Transcript,
}

/// Couples one remote shell with one browser transport.
///
/// Three tasks run concurrently: the relay forwards client input to the
/// shell, the flusher sends buffered output to the client, and the watcher
/// waits for the shell to exit. The first of them to stop raises the shared
/// [`TerminationSignal`]; the others observe it and return. Once all have
/// returned the transport and the shell are closed, each exactly once.
#[derive(Debug)]
pub struct Bridge {
    id: Uuid,
    config: BridgeConfig,
    signal: TerminationSignal,
    state: watch::Sender<BridgeState>,
}

impl Bridge {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let (state, _) = watch::channel(BridgeState::Starting);
        Self {
            id: Uuid::new_v4(),
            config,
            signal: TerminationSignal::new(),
            state,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Handle for stopping the bridge from outside.
    #[must_use]
    pub fn signal(&self) -> TerminationSignal {
        self.signal.clone()
    }

    #[must_use]
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Run until either side ends, then release both.
    pub async fn run<S, R, W>(self, session: S, source: R, sink: W) -> BridgeOutcome
    where
        S: RemoteShell,
        R: FrameSource,
        W: FrameSink,
    {
        let span = tracing::info_span!("bridge", id = %self.id);
        self.drive(session, source, sink).instrument(span).await
    }

    async fn drive<S, R, W>(self, session: S, mut source: R, mut sink: W) -> BridgeOutcome
    where
        S: RemoteShell,
        R: FrameSource,
        W: FrameSink,
    {
        self.state.send_replace(BridgeState::Running);
        tracing::info!("Bridge running");

        let mut transcript = Transcript::new();
        let ((), (), exit_status, ()) = tokio::join!(
            relay::run(
                &session,
                &mut source,
                &mut transcript,
                &self.signal,
                self.config.write_timeout(),
            ),
            flusher::run(session.output(), &mut sink, &self.signal, &self.config),
            watcher::run(&session, &self.signal),
            self.observe_termination(),
        );

        match time::timeout(self.config.flush_interval(), sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Transport close failed"),
            Err(_) => tracing::debug!("Transport close timed out"),
        }
        drop(source);
        session.close().await;
        self.state.send_replace(BridgeState::Closed);

        let reason = self.signal.reason().unwrap_or(StopReason::Shutdown);
        tracing::info!(
            reason = %reason,
            input_bytes = transcript.len(),
            "Bridge closed"
        );

        BridgeOutcome {
            id: self.id,
            reason,
            exit_status,
            transcript,
        }
    }

    async fn observe_termination(&self) {
        self.signal.raised().await;
        if let Some(reason) = self.signal.reason() {
            tracing::debug!(reason = %reason, "Termination requested");
        }
        self.state.send_replace(BridgeState::Draining);
    }
}

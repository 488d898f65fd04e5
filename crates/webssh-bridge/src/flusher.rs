//! Remote-to-client direction.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use webssh_core::{
    FrameSink, OutputAggregator, OutputFrame, StopReason, TerminationSignal, TransportError,
    Utf8Decoder,
};

use crate::config::BridgeConfig;

/// Send buffered remote output to the client once per flush tick, and a
/// keepalive ping once per keepalive period, until the signal is raised.
///
/// A send in flight is abandoned as soon as the signal is raised. When the
/// remote shell ended the bridge, output still buffered is sent one last
/// time, bounded by one flush interval.
pub(crate) async fn run<W>(
    output: &OutputAggregator,
    sink: &mut W,
    signal: &TerminationSignal,
    config: &BridgeConfig,
) where
    W: FrameSink + ?Sized,
{
    let send_timeout = config.write_timeout();
    let mut decoder = Utf8Decoder::new();

    let mut flush = time::interval(config.flush_interval());
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut keepalive = config.keepalive_interval().map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let sent = tokio::select! {
            biased;
            () = signal.raised() => break,
            _ = flush.tick() => {
                let text = output.drain_if_non_empty().and_then(|chunk| {
                    tracing::trace!(bytes = chunk.len(), "Flushing output");
                    decoder.decode(&chunk)
                });
                let Some(text) = text else { continue };
                signal.unless_raised(send_output(sink, text, send_timeout)).await
            }
            () = next_keepalive(keepalive.as_mut()) => {
                tracing::trace!("Sending keepalive");
                signal.unless_raised(bounded(send_timeout, sink.send_ping())).await
            }
        };
        match sent {
            None => break,
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to send to client");
                signal.raise(StopReason::SendFailed(e.to_string()));
                return;
            }
        }
    }

    if signal.reason() == Some(StopReason::RemoteExited) {
        final_flush(output, sink, &mut decoder, config.flush_interval()).await;
    }
}

/// Send whatever output is left, including an incomplete trailing
/// character as U+FFFD.
async fn final_flush<W>(
    output: &OutputAggregator,
    sink: &mut W,
    decoder: &mut Utf8Decoder,
    limit: Duration,
) where
    W: FrameSink + ?Sized,
{
    let mut text = output
        .drain_if_non_empty()
        .and_then(|chunk| decoder.decode(&chunk))
        .unwrap_or_default();
    if let Some(tail) = decoder.finish() {
        text.push_str(&tail);
    }
    if text.is_empty() {
        return;
    }
    if let Err(e) = send_output(sink, text, limit).await {
        tracing::debug!(error = %e, "Final flush failed");
    }
}

async fn next_keepalive(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_output<W>(sink: &mut W, text: String, limit: Duration) -> Result<(), TransportError>
where
    W: FrameSink + ?Sized,
{
    let frame = OutputFrame::command(text).to_json()?;
    bounded(limit, sink.send_frame(frame)).await
}

async fn bounded<F>(limit: Duration, send: F) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    time::timeout(limit, send)
        .await
        .unwrap_or(Err(TransportError::Timeout(limit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SinkEvent, transport};

    fn config() -> BridgeConfig {
        BridgeConfig {
            flush_interval_ms: 10,
            keepalive_interval_secs: 0,
            write_timeout_ms: 1000,
        }
    }

    async fn stop_after(signal: &TerminationSignal, after: Duration, reason: StopReason) {
        time::sleep(after).await;
        signal.raise(reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_within_a_tick_share_a_frame() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        output.write(b"total 0\r\n");
        output.write(b"drwxr-xr-x ");
        output.write(b".\r\n");

        tokio::join!(
            run(&output, &mut sink, &signal, &config),
            stop_after(&signal, Duration::from_millis(50), StopReason::Shutdown),
        );

        assert_eq!(client.output(), vec!["total 0\r\ndrwxr-xr-x .\r\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_ticks_keep_order() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        let producer = async {
            output.write(b"first");
            time::sleep(Duration::from_millis(25)).await;
            output.write(b"second");
            time::sleep(Duration::from_millis(25)).await;
            signal.raise(StopReason::Shutdown);
        };
        tokio::join!(run(&output, &mut sink, &signal, &config), producer);

        assert_eq!(client.output(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sends_nothing() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        tokio::join!(
            run(&output, &mut sink, &signal, &config),
            stop_after(&signal, Duration::from_secs(1), StopReason::Shutdown),
        );

        assert!(client.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_character_waits_for_completion() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = config();
        let euro = "\u{20ac}".as_bytes();

        let producer = async {
            output.write(&euro[..2]);
            time::sleep(Duration::from_millis(25)).await;
            output.write(&euro[2..]);
            time::sleep(Duration::from_millis(25)).await;
            signal.raise(StopReason::Shutdown);
        };
        tokio::join!(run(&output, &mut sink, &signal, &config), producer);

        assert_eq!(client.output(), vec!["\u{20ac}"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_after_remote_exit() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        output.write(b"logout\r\n");
        signal.raise(StopReason::RemoteExited);
        run(&output, &mut sink, &signal, &config).await;

        assert_eq!(client.output(), vec!["logout\r\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_replaces_incomplete_tail() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        output.write(b"bye ");
        output.write(&"\u{20ac}".as_bytes()[..2]);
        signal.raise(StopReason::RemoteExited);
        run(&output, &mut sink, &signal, &config).await;

        assert_eq!(client.output(), vec!["bye \u{fffd}"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_is_bounded_by_flush_interval() {
        let output = OutputAggregator::new();
        let (_source, mut sink, client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        client.stall_sends();
        output.write(b"logout\r\n");
        signal.raise(StopReason::RemoteExited);
        let started = Instant::now();
        run(&output, &mut sink, &signal, &config).await;

        assert!(started.elapsed() <= config.flush_interval());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_yields_to_signal() {
        let output = OutputAggregator::new();
        let (_source, mut sink, client) = transport();
        let signal = TerminationSignal::new();
        let config = BridgeConfig {
            write_timeout_ms: 10_000,
            ..config()
        };

        client.stall_sends();
        output.write(b"prompt$ ");
        let started = Instant::now();
        tokio::join!(
            run(&output, &mut sink, &signal, &config),
            stop_after(&signal, Duration::from_millis(50), StopReason::TransportClosed),
        );

        assert!(started.elapsed() < Duration::from_millis(60));
        assert_eq!(signal.reason(), Some(StopReason::TransportClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_final_flush_on_other_reasons() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        output.write(b"unsent");
        signal.raise(StopReason::TransportClosed);
        run(&output, &mut sink, &signal, &config).await;

        assert!(client.events().is_empty());
        assert_eq!(output.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_raises_signal() {
        let output = OutputAggregator::new();
        let (_source, mut sink, client) = transport();
        let signal = TerminationSignal::new();
        let config = config();

        client.fail_sends();
        output.write(b"prompt$ ");
        run(&output, &mut sink, &signal, &config).await;

        assert!(matches!(signal.reason(), Some(StopReason::SendFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_pings() {
        let output = OutputAggregator::new();
        let (_source, mut sink, mut client) = transport();
        let signal = TerminationSignal::new();
        let config = BridgeConfig {
            keepalive_interval_secs: 1,
            ..config()
        };

        tokio::join!(
            run(&output, &mut sink, &signal, &config),
            stop_after(&signal, Duration::from_millis(2500), StopReason::Shutdown),
        );

        assert_eq!(client.events(), vec![SinkEvent::Ping, SinkEvent::Ping]);
    }
}

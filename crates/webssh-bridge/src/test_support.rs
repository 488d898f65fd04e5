//! In-process doubles for the remote shell and the browser transport.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use webssh_core::{
    ControlMessage, ExitStatus, FrameSink, FrameSource, OutputAggregator, OutputFrame, RemoteShell,
    SessionError, TransportError,
};

pub(crate) struct MockShell {
    output: OutputAggregator,
    writes: Mutex<Vec<Vec<u8>>>,
    resizes: Mutex<Vec<(u32, u32)>>,
    exit: watch::Sender<Option<ExitStatus>>,
    closes: AtomicUsize,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    fail_resizes: AtomicBool,
}

impl MockShell {
    pub(crate) fn new() -> Arc<Self> {
        let (exit, _) = watch::channel(None);
        Arc::new(Self {
            output: OutputAggregator::new(),
            writes: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            exit,
            closes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            stall_writes: AtomicBool::new(false),
            fail_resizes: AtomicBool::new(false),
        })
    }

    /// Simulate output arriving from the remote host.
    pub(crate) fn emit(&self, data: &[u8]) {
        self.output.write(data);
    }

    pub(crate) fn exit(&self, status: ExitStatus) {
        self.exit.send_replace(Some(status));
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes.lock().unwrap().concat()
    }

    pub(crate) fn resizes(&self) -> Vec<(u32, u32)> {
        self.resizes.lock().unwrap().clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_resizes(&self) {
        self.fail_resizes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SessionError> {
        if self.fail_resizes.load(Ordering::SeqCst) {
            return Err(SessionError::Protocol("window change rejected".into()));
        }
        self.resizes.lock().unwrap().push((cols, rows));
        Ok(())
    }

    async fn wait(&self) -> Result<ExitStatus, SessionError> {
        let mut exit = self.exit.subscribe();
        let status = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SessionError::Closed)?
            .clone();
        Ok(status.unwrap_or(ExitStatus::ConnectionLost))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn output(&self) -> &OutputAggregator {
        &self.output
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Frame(String),
    Ping,
}

pub(crate) struct MockSource {
    inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await
    }
}

pub(crate) struct MockSink {
    outbound: mpsc::UnboundedSender<SinkEvent>,
    closes: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
    stall_sends: Arc<AtomicBool>,
}

impl MockSink {
    async fn deliver(&self, event: SinkEvent) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io("connection reset".into()));
        }
        if self.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.outbound.send(event).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError> {
        self.deliver(SinkEvent::Frame(text)).await
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.deliver(SinkEvent::Ping).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The browser end of a mock transport.
pub(crate) struct MockClient {
    inbound: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<SinkEvent>,
    closes: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
    stall_sends: Arc<AtomicBool>,
}

impl MockClient {
    pub(crate) fn send_raw(&self, text: &str) {
        if let Some(inbound) = &self.inbound {
            inbound.send(Ok(text.to_owned())).unwrap();
        }
    }

    pub(crate) fn send(&self, message: &ControlMessage) {
        self.send_raw(&message.to_json());
    }

    pub(crate) fn send_error(&self, error: TransportError) {
        if let Some(inbound) = &self.inbound {
            inbound.send(Err(error)).unwrap();
        }
    }

    /// Close the client side of the transport.
    pub(crate) fn disconnect(&mut self) {
        self.inbound = None;
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Stop reading, leaving every send to the client pending.
    pub(crate) fn stall_sends(&self) {
        self.stall_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Everything the bridge sent so far.
    pub(crate) fn events(&mut self) -> Vec<SinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.outbound.try_recv() {
            events.push(event);
        }
        events
    }

    /// Decoded payloads of the output frames sent so far.
    pub(crate) fn output(&mut self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Frame(text) => {
                    let frame: OutputFrame = serde_json::from_str(&text).unwrap();
                    Some(frame.data)
                }
                SinkEvent::Ping => None,
            })
            .collect()
    }
}

pub(crate) fn transport() -> (MockSource, MockSink, MockClient) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));
    let fail_sends = Arc::new(AtomicBool::new(false));
    let stall_sends = Arc::new(AtomicBool::new(false));

    let source = MockSource { inbound: inbound_rx };
    let sink = MockSink {
        outbound: outbound_tx,
        closes: Arc::clone(&closes),
        fail_sends: Arc::clone(&fail_sends),
        stall_sends: Arc::clone(&stall_sends),
    };
    let client = MockClient {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
        closes,
        fail_sends,
        stall_sends,
    };
    (source, sink, client)
}

//! WebSocket transport for browser terminals.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use webssh_bridge::{Bridge, BridgeConfig, BridgeRegistry};
use webssh_core::{FrameSink, FrameSource, TransportError};

use crate::{connector::SessionConnector, params::PtyQuery};

/// Path of the terminal WebSocket endpoint.
pub const SSH_ROUTE: &str = "/api/v1/ssh/";

/// Receiving half of a WebSocket as a frame source.
///
/// Text and UTF-8 binary messages are frames. Ping and pong are answered by
/// axum and skipped here.
pub struct WsFrameSource {
    receiver: SplitStream<WebSocket>,
}

impl WsFrameSource {
    #[must_use]
    pub const fn new(receiver: SplitStream<WebSocket>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let msg = match self.receiver.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(data) => {
                    let text = String::from_utf8(data.to_vec())
                        .map_err(|e| TransportError::Io(format!("binary frame is not UTF-8: {e}")));
                    return Some(text);
                }
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}

/// Sending half of a WebSocket as a frame sink.
pub struct WsFrameSink {
    sender: SplitSink<WebSocket, Message>,
}

impl WsFrameSink {
    #[must_use]
    pub const fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_frame(&mut self, text: String) -> Result<(), TransportError> {
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.sender
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sender
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// WebSocket handler state.
pub struct WsState<C> {
    connector: Arc<C>,
    registry: BridgeRegistry,
    bridge_config: BridgeConfig,
}

impl<C> Clone for WsState<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            registry: self.registry.clone(),
            bridge_config: self.bridge_config,
        }
    }
}

impl<C> WsState<C> {
    /// Create new WebSocket state.
    #[must_use]
    pub const fn new(
        connector: Arc<C>,
        registry: BridgeRegistry,
        bridge_config: BridgeConfig,
    ) -> Self {
        Self {
            connector,
            registry,
            bridge_config,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &BridgeRegistry {
        &self.registry
    }
}

/// WebSocket upgrade handler.
///
/// Connects the remote session first; the upgrade only happens once a shell
/// is running. A failed connect answers `502 Bad Gateway`.
pub async fn ws_handler<C>(
    ws: WebSocketUpgrade,
    Query(query): Query<PtyQuery>,
    State(state): State<WsState<C>>,
) -> Response
where
    C: SessionConnector,
{
    let size = query.size();
    let session = match state.connector.connect(size).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(
                error = %e,
                cols = size.cols,
                rows = size.rows,
                "Failed to open remote session"
            );
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };
    tracing::debug!(cols = size.cols, rows = size.rows, "Remote session ready");

    ws.on_failed_upgrade(|e: axum::Error| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, session, state))
}

async fn handle_socket<C>(socket: WebSocket, session: C::Session, state: WsState<C>)
where
    C: SessionConnector,
{
    let (sender, receiver) = socket.split();
    let bridge = Bridge::new(state.bridge_config);
    let id = bridge.id();

    state.registry.register(&bridge).await;
    let outcome = bridge
        .run(session, WsFrameSource::new(receiver), WsFrameSink::new(sender))
        .await;
    state.registry.remove(id).await;

    tracing::info!(
        id = %id,
        reason = %outcome.reason,
        exit_status = ?outcome.exit_status,
        input_bytes = outcome.transcript.len(),
        "Connection finished"
    );
}

/// Create WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(connector, registry, BridgeConfig::default()));
/// ```
#[must_use]
pub fn create_ws_router<C>(
    connector: Arc<C>,
    registry: BridgeRegistry,
    bridge_config: BridgeConfig,
) -> axum::Router
where
    C: SessionConnector,
{
    axum::Router::new()
        .route(SSH_ROUTE, axum::routing::get(ws_handler::<C>))
        .with_state(WsState::new(connector, registry, bridge_config))
}

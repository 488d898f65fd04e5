//! Live bridges of a process.

use std::{collections::HashMap, sync::Arc, time::Instant};

use tokio::sync::RwLock;
use uuid::Uuid;
use webssh_core::{StopReason, TerminationSignal};

use crate::controller::Bridge;

/// Registered bridge state.
#[derive(Debug)]
struct ActiveBridge {
    signal: TerminationSignal,
    started_at: Instant,
}

/// Tracks running bridges so the host can stop them.
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct BridgeRegistry {
    active_bridges: Arc<RwLock<HashMap<Uuid, ActiveBridge>>>,
}

impl BridgeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a bridge until [`remove`](Self::remove) is called with its id.
    pub async fn register(&self, bridge: &Bridge) {
        let active = ActiveBridge {
            signal: bridge.signal(),
            started_at: Instant::now(),
        };
        self.active_bridges.write().await.insert(bridge.id(), active);
        tracing::debug!(id = %bridge.id(), "Bridge registered");
    }

    /// Stop tracking a bridge.
    pub async fn remove(&self, id: Uuid) {
        if let Some(active) = self.active_bridges.write().await.remove(&id) {
            tracing::debug!(
                id = %id,
                elapsed_ms = active.started_at.elapsed().as_millis(),
                "Bridge unregistered"
            );
        }
    }

    /// Number of tracked bridges.
    pub async fn len(&self) -> usize {
        self.active_bridges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.active_bridges.read().await.is_empty()
    }

    /// Ids of tracked bridges.
    pub async fn ids(&self) -> Vec<Uuid> {
        self.active_bridges.read().await.keys().copied().collect()
    }

    /// Ask one bridge to stop. Returns `false` if it is not tracked.
    pub async fn shutdown(&self, id: Uuid) -> bool {
        self.active_bridges
            .read()
            .await
            .get(&id)
            .is_some_and(|active| {
                active.signal.raise(StopReason::Shutdown);
                true
            })
    }

    /// Ask every tracked bridge to stop. Returns how many were asked.
    pub async fn shutdown_all(&self) -> usize {
        let active = self.active_bridges.read().await;
        for bridge in active.values() {
            bridge.signal.raise(StopReason::Shutdown);
        }
        tracing::info!(count = active.len(), "Stopping active bridges");
        active.len()
    }
}

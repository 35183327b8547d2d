//! Lifecycle state of the node service
//!
//! Tracks `Constructed -> Started <-> Stopped` and assembles the status
//! snapshot handed to the presentation layer.

use super::handle::{NodeId, RuntimeStatus};
use super::network::Network;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Node built, never started
    #[default]
    Constructed,
    Started,
    Stopped,
}

/// Status of the node (sent to the presentation layer)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub state: LifecycleState,
    pub network: Network,
    pub node_id: NodeId,
    pub is_running: bool,
    pub is_listening: bool,
    pub best_block_height: u32,

    /// Uptime in seconds (if started)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,

    pub event_loop_running: bool,
}

#[derive(Debug, Default)]
struct Inner {
    lifecycle: LifecycleState,
    started_at: Option<Instant>,
}

impl Inner {
    fn uptime_secs(&self) -> Option<u64> {
        self.started_at.map(|t| t.elapsed().as_secs())
    }
}

/// Runtime state shared between the service and its callers
#[derive(Debug, Default)]
pub struct ServiceState {
    inner: Mutex<Inner>,
}

impl ServiceState {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lock().lifecycle
    }

    /// Record a successful start
    pub fn mark_started(&self) {
        let mut inner = self.lock();
        inner.lifecycle = LifecycleState::Started;
        inner.started_at = Some(Instant::now());
    }

    /// Record a successful stop
    pub fn mark_stopped(&self) {
        let mut inner = self.lock();
        inner.lifecycle = LifecycleState::Stopped;
        inner.started_at = None;
    }

    pub fn snapshot(
        &self,
        network: Network,
        node_id: NodeId,
        runtime: RuntimeStatus,
        event_loop_running: bool,
    ) -> NodeStatus {
        let inner = self.lock();
        NodeStatus {
            state: inner.lifecycle,
            network,
            node_id,
            is_running: runtime.is_running,
            is_listening: runtime.is_listening,
            best_block_height: runtime.best_block_height,
            uptime: inner.uptime_secs(),
            event_loop_running,
        }
    }
}

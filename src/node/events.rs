//! Event bus and event loop
//!
//! The loop drains the node's event queue: publish first, then acknowledge,
//! so a crash in between redelivers an event instead of losing it. The bus
//! is a bounded broadcast channel; a subscriber that falls behind loses the
//! oldest notifications and sees `RecvError::Lagged`.

use super::error::{Error, NodeError};
use super::error_mapper::{map_error, ErrorMessage};
use super::handle::{EventKind, LightningNode, NodeEvent};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What subscribers receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", rename_all = "camelCase")]
pub enum Notification {
    /// A channel finished negotiation and awaits confirmation
    PendingChannel { description: String },
    /// Any other node event
    NodeEvent { kind: EventKind, description: String },
    /// The event loop failed to poll or acknowledge
    Error { message: ErrorMessage },
}

/// Typed broadcast channel for node notifications
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    /// `capacity` notifications are buffered per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns the number of subscribers reached
    pub fn publish(&self, notification: Notification) -> usize {
        // No subscribers is not an error: the notification is simply unobserved
        self.sender.send(notification).unwrap_or(0)
    }

    /// Publish a node event on the channel matching its kind
    pub fn publish_event(&self, event: &NodeEvent) -> usize {
        let notification = match event.kind {
            EventKind::ChannelPending => Notification::PendingChannel {
                description: event.description.clone(),
            },
            kind => Notification::NodeEvent {
                kind,
                description: event.description.clone(),
            },
        };
        self.publish(notification)
    }

    pub fn publish_error(&self, error: &Error) -> usize {
        self.publish(Notification::Error {
            message: map_error(error),
        })
    }
}

/// Handle to a running event loop
#[derive(Debug)]
pub struct EventLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl EventLoop {
    /// Spawn the loop on the current tokio runtime
    pub fn spawn(node: Arc<dyn LightningNode>, bus: EventBus, poll_interval: Duration) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(node, bus, poll_interval, token.clone()));
        Self { token, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Ask the loop to stop after the current publish/acknowledge pair
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the loop to exit
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            log::error!("Event loop task failed: {}", e);
        }
    }
}

async fn run(
    node: Arc<dyn LightningNode>,
    bus: EventBus,
    poll_interval: Duration,
    token: CancellationToken,
) {
    log::info!("Event loop started (poll interval {:?})", poll_interval);

    while !token.is_cancelled() {
        let polled = {
            let node = node.clone();
            tokio::task::spawn_blocking(move || node.next_event()).await
        };

        match polled {
            Ok(Some(event)) => {
                let reached = bus.publish_event(&event);
                log::info!(
                    "Node event {:?} published to {} subscriber(s): {}",
                    event.kind,
                    reached,
                    event.description
                );

                if acknowledge(&node, &bus).await {
                    // Drain whatever else is queued before sleeping
                    continue;
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Event poll task failed: {}", e);
                bus.publish_error(&Error::Unexpected(NodeError::Other(e.to_string())));
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    log::info!("Event loop stopped");
}

/// Returns false when the event could not be acknowledged; the node will
/// redeliver it and the loop backs off for one interval first.
async fn acknowledge(node: &Arc<dyn LightningNode>, bus: &EventBus) -> bool {
    let acked = {
        let node = node.clone();
        tokio::task::spawn_blocking(move || node.event_handled()).await
    };
    match acked {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("Failed to acknowledge node event: {}", e);
            bus.publish_error(&Error::Unexpected(e));
            false
        }
        // Only reachable when panics unwind; release builds abort instead
        Err(e) => {
            log::error!("Event acknowledgment task failed: {}", e);
            bus.publish_error(&Error::Unexpected(NodeError::Other(e.to_string())));
            false
        }
    }
}

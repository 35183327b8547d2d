//! Monday Node Runner
//!
//! Headless runner for the node service: loads settings from the data
//! directory, builds the ldk-node backed node, starts it and logs every
//! notification until Ctrl-C.

use anyhow::Context;
use monday_node::node::{FileKeyStore, LdkNodeBuilder, NodeService, NodeSettings, Notification};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = monday_node::app_data_dir();
    let settings = NodeSettings::load(&data_dir);

    let _logger = monday_node::logging::init_logger(
        &monday_node::log_dir(&data_dir),
        settings.log_level.to_level_filter(),
    )?;
    log::info!("Monday node starting (data dir {})", data_dir.display());

    let storage_dir = settings.storage_dir(&data_dir);
    let key_store = Arc::new(FileKeyStore::in_data_dir(&data_dir));

    // Building opens the node's stores and may block on disk I/O
    let service = tokio::task::spawn_blocking(move || {
        NodeService::new(key_store, &LdkNodeBuilder, &storage_dir, &settings)
    })
    .await
    .context("Node construction task failed")??;
    let service = Arc::new(service);

    service.start().await.context("Failed to start node")?;
    log::info!(
        "Node {} running on {}",
        service.node_id(),
        service.network()
    );

    let mut notifications = service.subscribe();
    service.listen_for_events().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown requested");
                break;
            }
            received = notifications.recv() => match received {
                Ok(Notification::PendingChannel { description }) => {
                    log::info!("Channel pending: {}", description);
                }
                Ok(Notification::NodeEvent { kind, description }) => {
                    log::info!("{:?}: {}", kind, description);
                }
                Ok(Notification::Error { message }) => {
                    log::error!("{}: {}", message.title, message.detail);
                }
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("Missed {} notifications", missed);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    service.stop_listening().await;
    if let Err(e) = service.stop().await {
        log::error!("Failed to stop node: {}", e);
    }
    log::info!("Monday node stopped");
    Ok(())
}

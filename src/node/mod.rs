//! Lightning node service for the Monday wallet
//!
//! This module configures, starts and operates an embedded Lightning node,
//! keeps its seed and settings on disk, and turns the node's event queue
//! into notifications for the presentation layer.
//!
//! ## Features
//!
//! - **Key material**: Seed phrase generated lazily on first run and reused afterwards
//! - **Configuration**: Per-network chain backend and gossip source defaults
//! - **Operations**: Peers, channels, payments and on-chain wallet behind one queue
//! - **Events**: Cancellable event loop publishing on a bounded broadcast bus
//! - **Errors**: Every failure mapped to a user-facing title and explanation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    node module                           │
//! ├─────────────────────────────────────────────────────────┤
//! │  commands.rs     - Caller-facing command handlers        │
//! │  service.rs      - Node service facade                   │
//! │  events.rs       - Event bus and event loop              │
//! │  state.rs        - Lifecycle state and status            │
//! │  config.rs       - Settings and node config builder      │
//! │  keystore.rs     - Persisted seed, network, backend URL  │
//! │  network.rs      - Per-network profiles                  │
//! │  handle.rs       - Node handle traits and value types    │
//! │  ldk.rs          - ldk-node backed node handle           │
//! │  error.rs        - Error taxonomy                        │
//! │  error_mapper.rs - User-facing error messages            │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod error_mapper;
pub mod events;
pub mod handle;
pub mod keystore;
pub mod ldk;
pub mod network;
pub mod service;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use config::{build_node_config, NodeConfig, NodeSettings, ResolvedConfig};
pub use error::{Error, NodeError, Result, StorageError};
pub use error_mapper::{map_error, ErrorMessage};
pub use events::{EventBus, EventLoop, Notification};
pub use handle::{LightningNode, NodeBuilder};
pub use keystore::{BackupInfo, FileKeyStore, KeyStore, MemoryKeyStore};
pub use ldk::LdkNodeBuilder;
pub use network::Network;
pub use service::{NodeService, SharedNodeService};
pub use state::{LifecycleState, NodeStatus};

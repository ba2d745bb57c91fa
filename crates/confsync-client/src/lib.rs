//! confsync client - deduplicated configuration subscriptions.
//!
//! The [`ChannelManager`] keeps one upstream per distinct
//! `(operation, variables)` pair, fans payloads out to bounded listener
//! queues and reconnects with backoff. [`ConfigurationClient`] layers the
//! `ConfigurationSubscription` operation and the normalized stores on top.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use confsync_client::{ClientConfig, ConfigurationClient, MemoryTransport, Notification};
//! use confsync_proto::{ConfigurationVariables, PageFilter};
//!
//! let transport = MemoryTransport::new();
//! let client = ConfigurationClient::new(Arc::new(transport.clone()), ClientConfig::default())?;
//!
//! let variables = ConfigurationVariables::uniform(PageFilter::new(1, 10));
//! let mut subscription = client.watch(&variables)?;
//!
//! while let Some(notification) = subscription.recv().await {
//!     if let Notification::Snapshot { update, .. } = notification {
//!         for collection in update.collections() {
//!             println!("{}: {} added", collection.key, collection.changes.added.len());
//!         }
//!     }
//! }
//! ```

pub mod backoff;
pub mod channel;
pub mod config;
pub mod configuration;
pub mod error;
pub mod manager;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use channel::{ChannelKey, ChannelState, ListenerHandle, Notification};
pub use config::ClientConfig;
pub use configuration::{
    CollectionUpdate, ConfigurationClient, ConfigurationHandler, ConfigurationUpdate,
};
pub use error::Error;
pub use manager::{ChannelManager, ManagerStats, RawHandler, SnapshotHandler, Subscription};
pub use transport::{MemoryTransport, Transport, TransportError, Upstream};

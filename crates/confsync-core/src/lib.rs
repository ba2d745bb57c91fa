//! confsync core - operation registry and normalized result store.
//!
//! This crate holds the client-side state of configuration subscriptions:
//! the [`DocumentRegistry`] of compiled operations and the
//! [`NormalizedStore`] that turns page snapshots into flat entity tables.

pub mod error;
pub mod registry;
pub mod store;

pub use error::Error;
pub use registry::{DocumentRegistry, RegistryBuilder};
pub use store::{ChangeSet, CollectionKey, NormalizedStore, SharedStore, StoreStats};

/// Re-export protocol types.
pub use confsync_proto as proto;

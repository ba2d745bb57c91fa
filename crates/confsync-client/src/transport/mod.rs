//! Upstream transport abstraction.
//!
//! A [`Transport`] opens one upstream per channel. The upstream yields raw
//! JSON payloads until it fails or ends; the channel driver owns it and
//! closes it by dropping it.

mod memory;

pub use memory::MemoryTransport;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use confsync_proto::OperationRequest;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection was lost.
    #[error("disconnected")]
    Disconnected,

    /// The upstream could not be opened.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// The upstream was closed by the remote side.
    #[error("upstream closed")]
    Closed,
}

/// Stream of payloads carried by an [`Upstream`].
pub type UpstreamEvents = BoxStream<'static, Result<Value, TransportError>>;

/// An open upstream for one operation instance.
pub struct Upstream {
    events: UpstreamEvents,
}

impl Upstream {
    /// Wrap a payload stream.
    pub fn new(events: UpstreamEvents) -> Self {
        Self { events }
    }

    /// Wait for the next payload. `None` means the upstream ended.
    pub async fn next_event(&mut self) -> Option<Result<Value, TransportError>> {
        self.events.next().await
    }
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream").finish_non_exhaustive()
    }
}

/// Opens upstreams for operation requests.
pub trait Transport: Send + Sync + 'static {
    /// Open an upstream carrying the payloads for `request`.
    fn open(&self, request: &OperationRequest) -> BoxFuture<'static, Result<Upstream, TransportError>>;
}

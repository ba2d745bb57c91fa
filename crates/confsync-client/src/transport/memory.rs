//! In-process transport.

use std::sync::Arc;

use futures::channel::mpsc;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use confsync_proto::OperationRequest;

use super::{Transport, TransportError, Upstream};

type EventSender = mpsc::UnboundedSender<Result<Value, TransportError>>;

struct OpenUpstream {
    request: OperationRequest,
    sender: EventSender,
}

#[derive(Default)]
struct MemoryState {
    upstreams: Vec<OpenUpstream>,
    next_id: u64,
    total_opens: u64,
    failing_opens: u32,
}

impl MemoryState {
    fn prune(&mut self) {
        self.upstreams.retain(|upstream| !upstream.sender.is_closed());
    }
}

/// Transport that keeps upstreams in memory.
///
/// Payloads are pushed by the caller; disconnects and open failures can be
/// injected. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a payload to every open upstream of `operation`.
    ///
    /// Returns the number of upstreams that received it.
    pub fn push(&self, operation: &str, payload: Value) -> usize {
        self.push_where(|request| request.operation_name == operation, payload)
    }

    /// Push a payload to every open upstream whose request matches.
    pub fn push_where<F>(&self, matches: F, payload: Value) -> usize
    where
        F: Fn(&OperationRequest) -> bool,
    {
        let mut state = self.state.lock();
        state.prune();

        let mut delivered = 0;
        for upstream in state.upstreams.iter().filter(|u| matches(&u.request)) {
            if upstream.sender.unbounded_send(Ok(payload.clone())).is_ok() {
                delivered += 1;
            }
        }
        tracing::trace!(delivered, "pushed payload");
        delivered
    }

    /// Fail every open upstream with [`TransportError::Disconnected`].
    ///
    /// Returns the number of upstreams that were open.
    pub fn disconnect(&self) -> usize {
        self.fail_all(TransportError::Disconnected)
    }

    /// Fail every open upstream with `error` and forget it.
    pub fn fail_all(&self, error: TransportError) -> usize {
        let mut state = self.state.lock();
        state.prune();

        let upstreams = std::mem::take(&mut state.upstreams);
        for upstream in &upstreams {
            let _ = upstream.sender.unbounded_send(Err(error.clone()));
            upstream.sender.close_channel();
        }
        tracing::debug!(upstreams = upstreams.len(), error = %error, "failed upstreams");
        upstreams.len()
    }

    /// End every open upstream without an error.
    pub fn end_all(&self) -> usize {
        let mut state = self.state.lock();
        state.prune();

        let upstreams = std::mem::take(&mut state.upstreams);
        for upstream in &upstreams {
            upstream.sender.close_channel();
        }
        upstreams.len()
    }

    /// Make the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.state.lock().failing_opens = count;
    }

    /// Number of upstreams currently open.
    pub fn open_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune();
        state.upstreams.len()
    }

    /// Successful opens since creation.
    pub fn total_opens(&self) -> u64 {
        self.state.lock().total_opens
    }

    /// Requests of the currently open upstreams, oldest first.
    pub fn open_requests(&self) -> Vec<OperationRequest> {
        let mut state = self.state.lock();
        state.prune();
        state
            .upstreams
            .iter()
            .map(|upstream| upstream.request.clone())
            .collect()
    }

    fn open_upstream(&self, request: &OperationRequest) -> Result<Upstream, TransportError> {
        let mut state = self.state.lock();

        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(TransportError::OpenFailed(
                "injected open failure".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded();
        let id = state.next_id;
        state.next_id += 1;
        state.total_opens += 1;
        state.upstreams.push(OpenUpstream {
            request: request.clone(),
            sender,
        });

        tracing::debug!(upstream = id, operation = %request.operation_name, "opened upstream");
        Ok(Upstream::new(receiver.boxed()))
    }
}

impl Transport for MemoryTransport {
    fn open(&self, request: &OperationRequest) -> BoxFuture<'static, Result<Upstream, TransportError>> {
        future::ready(self.open_upstream(request)).boxed()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTransport")
            .field("upstreams", &state.upstreams.len())
            .field("total_opens", &state.total_opens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn request(name: &str) -> OperationRequest {
        OperationRequest::new(name, "subscription { x }", Map::new())
    }

    #[tokio::test]
    async fn test_push_reaches_matching_upstreams() {
        let transport = MemoryTransport::new();
        let mut first = transport.open(&request("A")).await.unwrap();
        let _second = transport.open(&request("B")).await.unwrap();

        assert_eq!(transport.push("A", json!({"n": 1})), 1);
        assert_eq!(first.next_event().await, Some(Ok(json!({"n": 1}))));
    }

    #[tokio::test]
    async fn test_disconnect_fails_and_ends_upstreams() {
        let transport = MemoryTransport::new();
        let mut upstream = transport.open(&request("A")).await.unwrap();

        assert_eq!(transport.disconnect(), 1);
        assert_eq!(
            upstream.next_event().await,
            Some(Err(TransportError::Disconnected))
        );
        assert_eq!(upstream.next_event().await, None);
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_upstream_is_pruned() {
        let transport = MemoryTransport::new();
        let upstream = transport.open(&request("A")).await.unwrap();
        assert_eq!(transport.open_count(), 1);

        drop(upstream);
        assert_eq!(transport.open_count(), 0);
        assert_eq!(transport.push("A", json!({})), 0);
    }

    #[tokio::test]
    async fn test_injected_open_failures() {
        let transport = MemoryTransport::new();
        transport.fail_next_opens(1);

        assert!(matches!(
            transport.open(&request("A")).await,
            Err(TransportError::OpenFailed(_))
        ));
        assert!(transport.open(&request("A")).await.is_ok());
        assert_eq!(transport.total_opens(), 1);
    }
}

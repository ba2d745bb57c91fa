//! Channels and their listeners.
//!
//! A channel is one upstream for one `(operation, variables)` pair, shared by
//! every listener that subscribed with those exact variables.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};

use confsync_proto::OperationRequest;

/// Identity of a channel: operation name plus canonical variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    operation: String,
    variables: String,
}

impl ChannelKey {
    /// Build a key. Variable maps serialize with sorted keys, so equal
    /// bundles always produce equal keys.
    pub fn new(operation: impl Into<String>, variables: &Map<String, Value>) -> Self {
        Self {
            operation: operation.into(),
            variables: Value::Object(variables.clone()).to_string(),
        }
    }

    /// Operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Canonical variables JSON.
    pub fn variables(&self) -> &str {
        &self.variables
    }

    /// Short hex digest used in logs.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.operation.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.variables.as_bytes());
        hex::encode(&hasher.finalize().as_bytes()[..8])
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.operation, self.digest())
    }
}

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// First open in progress.
    Opening,
    /// Upstream open and delivering.
    Active,
    /// Upstream lost; waiting for backoff.
    Suspended,
    /// Reopen in progress.
    Reopening,
    /// Terminal.
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Opening => "opening",
            ChannelState::Active => "active",
            ChannelState::Suspended => "suspended",
            ChannelState::Reopening => "reopening",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Message delivered to a listener.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<U> {
    /// A handled snapshot. `sequence` increases by one per snapshot on the
    /// channel; a gap means this listener's queue overflowed.
    Snapshot { sequence: u64, update: U },
    /// The upstream was lost; cached data is no longer live.
    Suspended { reason: String },
    /// The upstream was reopened.
    Resumed,
    /// The channel is gone; no further notifications follow.
    Closed { reason: String },
}

impl<U> Notification<U> {
    /// The update carried by a snapshot notification.
    pub fn update(&self) -> Option<&U> {
        match self {
            Notification::Snapshot { update, .. } => Some(update),
            _ => None,
        }
    }

    /// Check whether this is the final notification.
    pub fn is_closed(&self) -> bool {
        matches!(self, Notification::Closed { .. })
    }
}

/// Identifies one listener on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    pub(crate) key: ChannelKey,
    pub(crate) id: u64,
}

impl ListenerHandle {
    /// Key of the channel this listener is attached to.
    pub fn channel(&self) -> &ChannelKey {
        &self.key
    }

    /// Listener id, unique per manager.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// Listener queues plus the outage, if any, they have been told about.
struct Listeners<U> {
    senders: HashMap<u64, mpsc::Sender<Notification<U>>>,
    suspended: Option<String>,
}

/// Shared channel state, owned jointly by the manager map and the driver task.
pub(crate) struct Channel<U> {
    key: ChannelKey,
    request: OperationRequest,
    state: Mutex<ChannelState>,
    listeners: Mutex<Listeners<U>>,
    sequence: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl<U: Clone> Channel<U> {
    pub fn new(key: ChannelKey, request: OperationRequest) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            key,
            request,
            state: Mutex::new(ChannelState::Opening),
            listeners: Mutex::new(Listeners {
                senders: HashMap::new(),
                suspended: None,
            }),
            sequence: AtomicU64::new(0),
            shutdown,
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn request(&self) -> &OperationRequest {
        &self.request
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ChannelState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            tracing::debug!(channel = %self.key, from = %previous, to = %state, "channel state");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed || *self.shutdown.borrow()
    }

    /// Attach a listener. Joining during an outage queues a `Suspended`
    /// notification first.
    pub fn attach(&self, id: u64, capacity: usize) -> mpsc::Receiver<Notification<U>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut listeners = self.listeners.lock();
        if let Some(reason) = &listeners.suspended {
            let _ = tx.try_send(Notification::Suspended {
                reason: reason.clone(),
            });
        }
        listeners.senders.insert(id, tx);
        rx
    }

    /// Remove a listener. Returns whether it was attached.
    pub fn detach(&self, id: u64) -> bool {
        self.listeners.lock().senders.remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().senders.len()
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Deliver without waiting. Full queues drop the notification; closed
    /// queues lose their listener.
    pub fn broadcast(&self, notification: Notification<U>) -> Delivery {
        let mut listeners = self.listeners.lock();
        self.deliver_locked(&mut listeners, notification)
    }

    /// Announce an outage. Returns `None` when one is already announced.
    pub fn suspend(&self, reason: &str) -> Option<Delivery> {
        let mut listeners = self.listeners.lock();
        if listeners.suspended.is_some() {
            return None;
        }
        listeners.suspended = Some(reason.to_string());
        Some(self.deliver_locked(
            &mut listeners,
            Notification::Suspended {
                reason: reason.to_string(),
            },
        ))
    }

    /// End an announced outage. Returns `None` when none was announced.
    pub fn resume(&self) -> Option<Delivery> {
        let mut listeners = self.listeners.lock();
        listeners.suspended.take()?;
        Some(self.deliver_locked(&mut listeners, Notification::Resumed))
    }

    fn deliver_locked(
        &self,
        listeners: &mut Listeners<U>,
        notification: Notification<U>,
    ) -> Delivery {
        let mut delivery = Delivery::default();

        listeners
            .senders
            .retain(|id, tx| match tx.try_send(notification.clone()) {
                Ok(()) => {
                    delivery.delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    delivery.dropped += 1;
                    tracing::debug!(channel = %self.key, listener = id, "listener queue full, dropped notification");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });

        delivery
    }

    /// Drop every listener sender so queues end once drained.
    pub fn release_listeners(&self) -> usize {
        let mut listeners = self.listeners.lock();
        let released = listeners.senders.len();
        listeners.senders.clear();
        released
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask the driver to stop.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn channel() -> Channel<u32> {
        let key = ChannelKey::new("Op", &Map::new());
        Channel::new(key, OperationRequest::new("Op", "subscription { x }", Map::new()))
    }

    #[test]
    fn test_key_ignores_variable_order() {
        let a = ChannelKey::new("Op", &vars(json!({"a": 1, "b": {"y": 2, "x": 1}})));
        let b = ChannelKey::new("Op", &vars(json!({"b": {"x": 1, "y": 2}, "a": 1})));
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 16);
    }

    #[test]
    fn test_key_differs_by_operation_and_variables() {
        let base = ChannelKey::new("Op", &vars(json!({"a": 1})));
        assert_ne!(base, ChannelKey::new("Other", &vars(json!({"a": 1}))));
        assert_ne!(base, ChannelKey::new("Op", &vars(json!({"a": 2}))));
    }

    #[test]
    fn test_broadcast_drops_when_full() {
        let channel = channel();
        let mut rx = channel.attach(1, 1);

        let first = channel.broadcast(Notification::Resumed);
        let second = channel.broadcast(Notification::Resumed);

        assert_eq!(first, Delivery { delivered: 1, dropped: 0 });
        assert_eq!(second, Delivery { delivered: 0, dropped: 1 });
        assert_eq!(rx.try_recv().unwrap(), Notification::Resumed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_prunes_closed_listeners() {
        let channel = channel();
        let rx = channel.attach(1, 4);
        let _kept = channel.attach(2, 4);
        drop(rx);

        let delivery = channel.broadcast(Notification::Resumed);
        assert_eq!(delivery.delivered, 1);
        assert_eq!(channel.listener_count(), 1);
        assert!(!channel.detach(1));
        assert!(channel.detach(2));
    }

    #[test]
    fn test_release_ends_queues() {
        let channel = channel();
        let mut rx = channel.attach(1, 4);
        channel.broadcast(Notification::Closed {
            reason: "done".into(),
        });

        assert_eq!(channel.release_listeners(), 1);
        assert!(rx.try_recv().unwrap().is_closed());
        assert_eq!(
            rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        );
    }

    #[test]
    fn test_late_attach_during_outage_sees_suspended() {
        let channel = channel();
        let mut early = channel.attach(1, 4);

        assert!(channel.suspend("disconnected").is_some());
        assert!(channel.suspend("again").is_none());
        let mut late = channel.attach(2, 4);

        let expected = Notification::Suspended {
            reason: "disconnected".into(),
        };
        assert_eq!(early.try_recv().unwrap(), expected);
        assert_eq!(late.try_recv().unwrap(), expected);

        assert_eq!(channel.resume().map(|d| d.delivered), Some(2));
        assert!(channel.resume().is_none());
        assert_eq!(late.try_recv().unwrap(), Notification::Resumed);

        let mut after = channel.attach(3, 4);
        assert!(after.try_recv().is_err());
    }

    #[test]
    fn test_sequence_starts_at_one() {
        let channel = channel();
        assert_eq!(channel.next_sequence(), 1);
        assert_eq!(channel.next_sequence(), 2);
    }

    #[test]
    fn test_close_sets_signal() {
        let channel = channel();
        let signal = channel.shutdown_signal();
        assert!(!channel.is_closed());
        channel.close();
        assert!(*signal.borrow());
        assert!(channel.is_closed());
    }
}

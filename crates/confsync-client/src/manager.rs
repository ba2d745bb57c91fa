//! Subscription channel manager.
//!
//! Listeners that subscribe with the same operation and variables share one
//! channel and one upstream. Each channel runs a driver task that opens the
//! upstream, hands payloads to the [`SnapshotHandler`], fans the result out
//! to listener queues and reconnects with backoff when the upstream is lost.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};

use confsync_core::DocumentRegistry;
use confsync_proto::{OperationDescriptor, OperationRequest};

use crate::channel::{Channel, ChannelKey, ChannelState, Delivery, ListenerHandle, Notification};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::transport::{Transport, TransportError, Upstream};

/// Turns raw payloads into listener updates.
pub trait SnapshotHandler: Send + Sync + 'static {
    /// Update type delivered to listeners.
    type Update: Clone + Send + Sync + 'static;

    /// Handle one payload pushed on `channel`.
    ///
    /// An error skips the payload; the channel stays open.
    fn handle(
        &self,
        channel: &ChannelKey,
        descriptor: &OperationDescriptor,
        variables: &Map<String, Value>,
        payload: Value,
    ) -> Result<Self::Update, confsync_proto::Error>;
}

/// Handler that forwards payloads unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawHandler;

impl SnapshotHandler for RawHandler {
    type Update = Arc<Value>;

    fn handle(
        &self,
        _channel: &ChannelKey,
        _descriptor: &OperationDescriptor,
        _variables: &Map<String, Value>,
        payload: Value,
    ) -> Result<Self::Update, confsync_proto::Error> {
        Ok(Arc::new(payload))
    }
}

/// Manager counters.
#[derive(Debug, Default)]
pub struct ManagerStats {
    channels_created: AtomicU64,
    channels_closed: AtomicU64,
    upstream_opens: AtomicU64,
    open_failures: AtomicU64,
    suspensions: AtomicU64,
    payloads: AtomicU64,
    rejected_payloads: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ManagerStats {
    /// Channels created.
    pub fn channels_created(&self) -> u64 {
        self.channels_created.load(Ordering::Relaxed)
    }

    /// Channels whose driver has exited.
    pub fn channels_closed(&self) -> u64 {
        self.channels_closed.load(Ordering::Relaxed)
    }

    /// Successful upstream opens, first opens and reopens.
    pub fn upstream_opens(&self) -> u64 {
        self.upstream_opens.load(Ordering::Relaxed)
    }

    /// Failed or timed out upstream opens.
    pub fn open_failures(&self) -> u64 {
        self.open_failures.load(Ordering::Relaxed)
    }

    /// Transitions into `Suspended`.
    pub fn suspensions(&self) -> u64 {
        self.suspensions.load(Ordering::Relaxed)
    }

    /// Payloads received from upstreams.
    pub fn payloads(&self) -> u64 {
        self.payloads.load(Ordering::Relaxed)
    }

    /// Payloads the handler rejected.
    pub fn rejected_payloads(&self) -> u64 {
        self.rejected_payloads.load(Ordering::Relaxed)
    }

    /// Notifications placed on listener queues.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Notifications dropped on full listener queues.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Detaches listeners on behalf of a dropped [`Subscription`].
trait Detach: Send + Sync {
    fn detach(&self, handle: &ListenerHandle) -> bool;
}

/// A listener attached to a channel.
///
/// Dropping the subscription detaches the listener.
pub struct Subscription<U> {
    handle: ListenerHandle,
    receiver: mpsc::Receiver<Notification<U>>,
    manager: Weak<dyn Detach>,
}

impl<U> Subscription<U> {
    /// Listener handle, usable with [`ChannelManager::unsubscribe`].
    pub fn handle(&self) -> &ListenerHandle {
        &self.handle
    }

    /// Key of the channel this listener is attached to.
    pub fn channel(&self) -> &ChannelKey {
        &self.handle.key
    }

    /// Wait for the next notification. `None` after the channel closed and
    /// the queue drained.
    pub async fn recv(&mut self) -> Option<Notification<U>> {
        self.receiver.recv().await
    }

    /// Take a queued notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification<U>> {
        self.receiver.try_recv().ok()
    }

    /// Detach now.
    pub fn unsubscribe(self) {}
}

impl<U> Drop for Subscription<U> {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.detach(&self.handle);
        }
    }
}

impl<U> std::fmt::Debug for Subscription<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.handle.key.to_string())
            .field("listener", &self.handle.id)
            .finish()
    }
}

struct ManagerInner<H: SnapshotHandler> {
    registry: Arc<DocumentRegistry>,
    transport: Arc<dyn Transport>,
    handler: Arc<H>,
    config: ClientConfig,
    channels: DashMap<ChannelKey, Arc<Channel<H::Update>>>,
    next_listener_id: AtomicU64,
    stats: Arc<ManagerStats>,
    shut_down: AtomicBool,
}

impl<H: SnapshotHandler> ManagerInner<H> {
    fn detach_listener(&self, handle: &ListenerHandle) -> bool {
        let channel = self
            .channels
            .get(&handle.key)
            .map(|entry| entry.value().clone());
        let Some(channel) = channel else {
            return false;
        };

        let detached = channel.detach(handle.id);

        // Only the exact channel instance is removed; a replacement created
        // after a close keeps running.
        let removed = self.channels.remove_if(&handle.key, |_, current| {
            Arc::ptr_eq(current, &channel) && current.listener_count() == 0
        });
        if let Some((_, channel)) = removed {
            channel.close();
            tracing::debug!(channel = %handle.key, "last listener left, closing channel");
        }

        if detached {
            tracing::debug!(channel = %handle.key, listener = handle.id, "listener detached");
        }
        detached
    }
}

impl<H: SnapshotHandler> Detach for ManagerInner<H> {
    fn detach(&self, handle: &ListenerHandle) -> bool {
        self.detach_listener(handle)
    }
}

impl<H: SnapshotHandler> Drop for ManagerInner<H> {
    fn drop(&mut self) {
        for entry in self.channels.iter() {
            entry.value().close();
        }
    }
}

/// Deduplicating subscription channel manager.
///
/// Must be created inside a tokio runtime; each channel spawns a task.
pub struct ChannelManager<H: SnapshotHandler> {
    inner: Arc<ManagerInner<H>>,
}

impl<H: SnapshotHandler> ChannelManager<H> {
    /// Create a manager.
    pub fn new(
        registry: Arc<DocumentRegistry>,
        transport: Arc<dyn Transport>,
        handler: H,
        config: ClientConfig,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(ManagerInner {
                registry,
                transport,
                handler: Arc::new(handler),
                config,
                channels: DashMap::new(),
                next_listener_id: AtomicU64::new(1),
                stats: Arc::new(ManagerStats::default()),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Subscribe to `operation` with `variables`.
    ///
    /// Variables are validated before anything reaches the transport. A
    /// second subscriber with identical variables joins the existing channel.
    pub fn subscribe(
        &self,
        operation: &str,
        variables: Map<String, Value>,
    ) -> Result<Subscription<H::Update>, Error> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }

        let (descriptor, variables) = self.inner.registry.prepare(operation, &variables)?;
        let key = ChannelKey::new(operation, &variables);
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let capacity = self.inner.config.listener_queue_capacity;

        let receiver = match self.inner.channels.entry(key.clone()) {
            Entry::Occupied(entry) if !entry.get().is_closed() => {
                let receiver = entry.get().attach(id, capacity);
                tracing::debug!(
                    channel = %key,
                    listener = id,
                    listeners = entry.get().listener_count(),
                    "joined existing channel"
                );
                receiver
            }
            Entry::Occupied(mut entry) => {
                let channel = self.open_channel(&key, &descriptor, variables);
                let receiver = channel.attach(id, capacity);
                entry.insert(channel);
                tracing::debug!(channel = %key, listener = id, "replaced closed channel");
                receiver
            }
            Entry::Vacant(entry) => {
                let channel = self.open_channel(&key, &descriptor, variables);
                let receiver = channel.attach(id, capacity);
                entry.insert(channel);
                tracing::debug!(channel = %key, listener = id, "created channel");
                receiver
            }
        };

        let manager: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        Ok(Subscription {
            handle: ListenerHandle { key, id },
            receiver,
            manager,
        })
    }

    /// Detach a listener. The channel closes when its last listener leaves.
    pub fn unsubscribe(&self, handle: &ListenerHandle) -> Result<(), Error> {
        if self.inner.detach_listener(handle) {
            Ok(())
        } else {
            Err(Error::NotSubscribed)
        }
    }

    /// Close every channel and refuse new subscriptions.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);

        let keys: Vec<ChannelKey> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in &keys {
            if let Some((_, channel)) = self.inner.channels.remove(key) {
                channel.close();
            }
        }

        tracing::info!(channels = keys.len(), "channel manager shut down");
    }

    /// Number of channels in the map, closed ones included until replaced
    /// or released.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// State of a channel.
    pub fn channel_state(&self, key: &ChannelKey) -> Option<ChannelState> {
        self.inner.channels.get(key).map(|entry| entry.value().state())
    }

    /// Listeners attached to a channel.
    pub fn listener_count(&self, key: &ChannelKey) -> usize {
        self.inner
            .channels
            .get(key)
            .map(|entry| entry.value().listener_count())
            .unwrap_or(0)
    }

    /// Keys of all channels, sorted.
    pub fn channels(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Manager counters.
    pub fn stats(&self) -> &ManagerStats {
        &self.inner.stats
    }

    /// The operation registry.
    pub fn registry(&self) -> &DocumentRegistry {
        &self.inner.registry
    }

    /// The payload handler.
    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    /// The configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn open_channel(
        &self,
        key: &ChannelKey,
        descriptor: &Arc<OperationDescriptor>,
        variables: Map<String, Value>,
    ) -> Arc<Channel<H::Update>> {
        let request = OperationRequest::new(&descriptor.name, &descriptor.text, variables);
        let channel = Arc::new(Channel::new(key.clone(), request));
        ManagerStats::incr(&self.inner.stats.channels_created);

        let driver = Driver {
            channel: channel.clone(),
            descriptor: descriptor.clone(),
            transport: self.inner.transport.clone(),
            handler: self.inner.handler.clone(),
            config: self.inner.config.clone(),
            stats: self.inner.stats.clone(),
        };
        tokio::spawn(driver.run());

        channel
    }
}

impl ChannelManager<RawHandler> {
    /// Create a manager that forwards raw payloads.
    pub fn raw(
        registry: Arc<DocumentRegistry>,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self, Error> {
        Self::new(registry, transport, RawHandler, config)
    }
}

impl<H: SnapshotHandler> std::fmt::Debug for ChannelManager<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channels", &self.inner.channels.len())
            .field("operations", &self.inner.registry.len())
            .finish()
    }
}

/// Why an upstream stopped.
enum Interruption {
    /// The channel was closed.
    Shutdown,
    /// The upstream failed or ended.
    Lost(String),
}

/// Per-channel task state.
struct Driver<H: SnapshotHandler> {
    channel: Arc<Channel<H::Update>>,
    descriptor: Arc<OperationDescriptor>,
    transport: Arc<dyn Transport>,
    handler: Arc<H>,
    config: ClientConfig,
    stats: Arc<ManagerStats>,
}

impl<H: SnapshotHandler> Driver<H> {
    async fn run(self) {
        let mut shutdown = self.channel.shutdown_signal();
        let mut attempt: u32 = 0;
        let mut reopening = false;

        let reason = loop {
            if *shutdown.borrow() {
                break "channel closed".to_string();
            }

            self.channel.set_state(if reopening {
                ChannelState::Reopening
            } else {
                ChannelState::Opening
            });

            let opened = tokio::select! {
                _ = shutdown.changed() => break "channel closed".to_string(),
                opened = tokio::time::timeout(
                    self.config.open_timeout,
                    self.transport.open(self.channel.request()),
                ) => opened,
            };

            let lost = match opened {
                Ok(Ok(upstream)) => {
                    attempt = 0;
                    ManagerStats::incr(&self.stats.upstream_opens);
                    self.channel.set_state(ChannelState::Active);
                    tracing::info!(
                        channel = %self.channel.key(),
                        operation = %self.descriptor.name,
                        "upstream open"
                    );
                    if let Some(delivery) = self.channel.resume() {
                        self.record(delivery);
                    }

                    match self.pump(upstream, &mut shutdown).await {
                        Interruption::Shutdown => break "channel closed".to_string(),
                        Interruption::Lost(reason) => reason,
                    }
                }
                Ok(Err(err)) => {
                    ManagerStats::incr(&self.stats.open_failures);
                    format!("open failed: {}", err)
                }
                Err(_) => {
                    ManagerStats::incr(&self.stats.open_failures);
                    format!("open timed out after {:?}", self.config.open_timeout)
                }
            };

            self.channel.set_state(ChannelState::Suspended);
            if let Some(delivery) = self.channel.suspend(&lost) {
                ManagerStats::incr(&self.stats.suspensions);
                self.record(delivery);
            }

            attempt += 1;
            if !self.config.reconnect.allows(attempt) {
                tracing::warn!(
                    channel = %self.channel.key(),
                    attempts = attempt - 1,
                    reason = %lost,
                    "reconnect attempts exhausted"
                );
                break format!("reconnect attempts exhausted: {}", lost);
            }

            let delay = self.config.reconnect.delay(attempt);
            tracing::warn!(
                channel = %self.channel.key(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %lost,
                "upstream lost, reconnecting"
            );

            tokio::select! {
                _ = shutdown.changed() => break "channel closed".to_string(),
                _ = tokio::time::sleep(delay) => {}
            }
            reopening = true;
        };

        self.channel.set_state(ChannelState::Closed);
        self.deliver(Notification::Closed {
            reason: reason.clone(),
        });
        self.channel.release_listeners();
        ManagerStats::incr(&self.stats.channels_closed);
        tracing::debug!(channel = %self.channel.key(), reason = %reason, "channel driver exited");
    }

    /// Read payloads until the upstream stops or the channel closes.
    async fn pump(
        &self,
        mut upstream: Upstream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Interruption {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Interruption::Shutdown,
                event = upstream.next_event() => match event {
                    Some(Ok(payload)) => self.on_payload(payload),
                    Some(Err(err)) => return Interruption::Lost(err.to_string()),
                    None => return Interruption::Lost(TransportError::Closed.to_string()),
                },
            }
        }
    }

    fn on_payload(&self, payload: Value) {
        ManagerStats::incr(&self.stats.payloads);

        let handled = self.handler.handle(
            self.channel.key(),
            &self.descriptor,
            &self.channel.request().variables,
            payload,
        );

        match handled {
            Ok(update) => {
                let sequence = self.channel.next_sequence();
                self.deliver(Notification::Snapshot { sequence, update });
                tracing::trace!(channel = %self.channel.key(), sequence, "snapshot delivered");
            }
            Err(err) => {
                ManagerStats::incr(&self.stats.rejected_payloads);
                tracing::warn!(channel = %self.channel.key(), error = %err, "payload rejected");
            }
        }
    }

    fn deliver(&self, notification: Notification<H::Update>) {
        let delivery = self.channel.broadcast(notification);
        self.record(delivery);
    }

    fn record(&self, delivery: Delivery) {
        self.stats
            .delivered
            .fetch_add(delivery.delivered as u64, Ordering::Relaxed);
        self.stats
            .dropped
            .fetch_add(delivery.dropped as u64, Ordering::Relaxed);
    }
}

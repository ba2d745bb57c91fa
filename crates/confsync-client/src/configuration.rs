//! Configuration subscription handling.
//!
//! [`ConfigurationHandler`] decodes `ConfigurationSubscription` payloads and
//! folds each page into the matching normalized store.
//! [`ConfigurationClient`] wires the handler to a [`ChannelManager`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use confsync_core::{ChangeSet, CollectionKey, DocumentRegistry, NormalizedStore, SharedStore};
use confsync_proto::{
    ApplicationResult, ConfigurationPayload, ConfigurationVariables, Entity, FilterResult,
    OperationDescriptor, Page, PageMeta, PatternResult, CONFIGURATION_SUBSCRIPTION,
};

use crate::channel::{ChannelKey, ListenerHandle};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::manager::{ChannelManager, SnapshotHandler, Subscription};
use crate::transport::Transport;

/// Result of applying one sub-result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionUpdate {
    /// Store key the page was applied under.
    #[serde(serialize_with = "serialize_key")]
    pub key: CollectionKey,
    /// Envelope of the applied page.
    pub meta: PageMeta,
    /// Ids added, updated and removed.
    pub changes: ChangeSet,
    /// Null rows in the page.
    pub failed_rows: usize,
}

fn serialize_key<S: serde::Serializer>(key: &CollectionKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(key)
}

/// Update emitted for one configuration payload.
///
/// A collection is `None` when the payload carried no page for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigurationUpdate {
    pub applications: Option<CollectionUpdate>,
    pub patterns: Option<CollectionUpdate>,
    pub filters: Option<CollectionUpdate>,
}

impl ConfigurationUpdate {
    /// Present collection updates.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionUpdate> {
        [&self.applications, &self.patterns, &self.filters]
            .into_iter()
            .flatten()
    }

    /// Check whether nothing changed in any collection.
    pub fn is_empty(&self) -> bool {
        self.collections().all(|update| update.changes.is_empty())
    }
}

/// Applies configuration payloads to the three collection stores.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationHandler {
    applications: SharedStore<ApplicationResult>,
    patterns: SharedStore<PatternResult>,
    filters: SharedStore<FilterResult>,
}

impl ConfigurationHandler {
    /// Create a handler with empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handler over existing stores.
    pub fn with_stores(
        applications: SharedStore<ApplicationResult>,
        patterns: SharedStore<PatternResult>,
        filters: SharedStore<FilterResult>,
    ) -> Self {
        Self {
            applications,
            patterns,
            filters,
        }
    }

    /// Application store.
    pub fn applications(&self) -> &NormalizedStore<ApplicationResult> {
        &self.applications
    }

    /// Pattern store.
    pub fn patterns(&self) -> &NormalizedStore<PatternResult> {
        &self.patterns
    }

    /// Filter store.
    pub fn filters(&self) -> &NormalizedStore<FilterResult> {
        &self.filters
    }

    /// Store key for `collection` under the selector bound in `variables`.
    pub fn collection_key(
        descriptor: &OperationDescriptor,
        variables: &Map<String, Value>,
        collection: &str,
    ) -> CollectionKey {
        let Some(name) = descriptor
            .selection
            .collection(collection)
            .and_then(|shape| shape.selector.as_deref())
        else {
            return CollectionKey::for_selector(collection, &Value::Null);
        };
        let raw = variables.get(name).unwrap_or(&Value::Null);
        let selector = descriptor
            .variables
            .get(name)
            .filter(|_| !raw.is_null())
            .and_then(|def| def.canonical(raw).ok())
            .unwrap_or_else(|| raw.clone());
        CollectionKey::for_selector(collection, &selector)
    }

    fn apply<T>(
        store: &NormalizedStore<T>,
        descriptor: &OperationDescriptor,
        variables: &Map<String, Value>,
        page: Option<Page<T>>,
    ) -> Option<CollectionUpdate>
    where
        T: Entity + Clone + PartialEq,
    {
        let page = page?;
        let key = Self::collection_key(descriptor, variables, T::COLLECTION);
        let changes = store.apply(&key, &page);
        Some(CollectionUpdate {
            key,
            meta: page.meta(),
            changes,
            failed_rows: page.failed_rows(),
        })
    }
}

impl SnapshotHandler for ConfigurationHandler {
    type Update = Arc<ConfigurationUpdate>;

    fn handle(
        &self,
        channel: &ChannelKey,
        descriptor: &OperationDescriptor,
        variables: &Map<String, Value>,
        payload: Value,
    ) -> Result<Self::Update, confsync_proto::Error> {
        let data = ConfigurationPayload::from_value(payload)?.configuration;

        if let Some(patterns) = &data.patterns {
            for pattern in patterns.rows().filter(|p| !p.is_supported()) {
                tracing::debug!(
                    channel = %channel,
                    pattern = %pattern.id,
                    errmsg = pattern.diagnostic().unwrap_or_default(),
                    "pattern cannot be supported"
                );
            }
        }

        let update = ConfigurationUpdate {
            applications: Self::apply(&self.applications, descriptor, variables, data.applications),
            patterns: Self::apply(&self.patterns, descriptor, variables, data.patterns),
            filters: Self::apply(&self.filters, descriptor, variables, data.filters),
        };

        Ok(Arc::new(update))
    }
}

/// Client for `ConfigurationSubscription`.
#[derive(Debug)]
pub struct ConfigurationClient {
    manager: ChannelManager<ConfigurationHandler>,
}

impl ConfigurationClient {
    /// Create a client over `transport` with the built-in registry.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self, Error> {
        let registry = Arc::new(DocumentRegistry::with_defaults());
        Self::with_handler(registry, transport, ConfigurationHandler::new(), config)
    }

    /// Create a client with an explicit registry and handler.
    pub fn with_handler(
        registry: Arc<DocumentRegistry>,
        transport: Arc<dyn Transport>,
        handler: ConfigurationHandler,
        config: ClientConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            manager: ChannelManager::new(registry, transport, handler, config)?,
        })
    }

    /// Watch the configuration pages selected by `variables`.
    pub fn watch(
        &self,
        variables: &ConfigurationVariables,
    ) -> Result<Subscription<Arc<ConfigurationUpdate>>, Error> {
        self.manager
            .subscribe(CONFIGURATION_SUBSCRIPTION, variables.to_variables())
    }

    /// Stop watching.
    pub fn unwatch(&self, handle: &ListenerHandle) -> Result<(), Error> {
        self.manager.unsubscribe(handle)
    }

    /// Store key of the application page selected by `variables`.
    pub fn application_key(&self, variables: &ConfigurationVariables) -> CollectionKey {
        CollectionKey::for_filter(ApplicationResult::COLLECTION, &variables.application_selector)
    }

    /// Store key of the pattern page selected by `variables`.
    pub fn pattern_key(&self, variables: &ConfigurationVariables) -> CollectionKey {
        CollectionKey::for_filter(PatternResult::COLLECTION, &variables.pattern_selector)
    }

    /// Store key of the filter page selected by `variables`.
    pub fn filter_key(&self, variables: &ConfigurationVariables) -> CollectionKey {
        CollectionKey::for_filter(FilterResult::COLLECTION, &variables.filter_selector)
    }

    /// Cached applications.
    pub fn applications(&self) -> &NormalizedStore<ApplicationResult> {
        self.manager.handler().applications()
    }

    /// Cached patterns.
    pub fn patterns(&self) -> &NormalizedStore<PatternResult> {
        self.manager.handler().patterns()
    }

    /// Cached filters.
    pub fn filters(&self) -> &NormalizedStore<FilterResult> {
        self.manager.handler().filters()
    }

    /// The underlying channel manager.
    pub fn manager(&self) -> &ChannelManager<ConfigurationHandler> {
        &self.manager
    }

    /// Close every channel.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

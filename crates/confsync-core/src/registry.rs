//! Registry of compiled operation descriptors.
//!
//! The registry is assembled once at startup through [`RegistryBuilder`] and
//! is read-only afterwards; share it behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use confsync_proto::OperationDescriptor;
use serde_json::{Map, Value};

use crate::error::Error;

/// Builder for a [`DocumentRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    operations: HashMap<String, Arc<OperationDescriptor>>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.
    ///
    /// Fails if an operation with the same name is already registered.
    pub fn register(mut self, descriptor: OperationDescriptor) -> Result<Self, Error> {
        if self.operations.contains_key(&descriptor.name) {
            return Err(Error::DuplicateOperation(descriptor.name));
        }
        tracing::debug!(
            operation = %descriptor.name,
            cache_id = %descriptor.cache_id,
            "registered operation"
        );
        self.operations
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(self)
    }

    /// Register the built-in operations.
    pub fn with_defaults(self) -> Result<Self, Error> {
        self.register(OperationDescriptor::configuration_subscription())
    }

    /// Freeze the registry.
    pub fn build(self) -> DocumentRegistry {
        DocumentRegistry {
            operations: self.operations,
        }
    }
}

/// Immutable registry of operation descriptors keyed by operation name.
#[derive(Debug, Clone, Default)]
pub struct DocumentRegistry {
    operations: HashMap<String, Arc<OperationDescriptor>>,
}

impl DocumentRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry holding only the built-in operations.
    pub fn with_defaults() -> Self {
        let mut operations = HashMap::new();
        let descriptor = OperationDescriptor::configuration_subscription();
        operations.insert(descriptor.name.clone(), Arc::new(descriptor));
        Self { operations }
    }

    /// Look up a descriptor by operation name.
    pub fn get(&self, name: &str) -> Result<Arc<OperationDescriptor>, Error> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Look up a descriptor and check a variables bundle against its schema.
    pub fn validate(
        &self,
        name: &str,
        variables: &Map<String, Value>,
    ) -> Result<Arc<OperationDescriptor>, Error> {
        let descriptor = self.get(name)?;
        descriptor.variables.validate(variables)?;
        Ok(descriptor)
    }

    /// Like [`validate`](Self::validate), also returning the bundle in
    /// canonical form.
    pub fn prepare(
        &self,
        name: &str,
        variables: &Map<String, Value>,
    ) -> Result<(Arc<OperationDescriptor>, Map<String, Value>), Error> {
        let descriptor = self.get(name)?;
        let canonical = descriptor.variables.canonicalize(variables)?;
        Ok((descriptor, canonical))
    }

    /// Check whether an operation is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

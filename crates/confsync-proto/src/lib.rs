//! confsync protocol types.
//!
//! This crate defines the data model of the `ConfigurationSubscription`
//! operation and the descriptors used to validate and route it.
//!
//! # Modules
//!
//! - [`filter`] - `PageFilter` selectors sent as variables
//! - [`page`] - Paginated response envelopes
//! - [`records`] - Application, pattern and filter rows
//! - [`message`] - Requests, variables and payloads
//! - [`document`] - Compiled operation descriptors
//! - [`error`] - Protocol error types
//!
//! # Decoding a payload
//!
//! ```ignore
//! use confsync_proto::ConfigurationPayload;
//!
//! let payload = ConfigurationPayload::from_value(value)?;
//! if let Some(patterns) = payload.configuration.patterns {
//!     for pattern in patterns.rows() {
//!         println!("{} supported={}", pattern.name, pattern.is_supported());
//!     }
//! }
//! ```

pub mod document;
pub mod error;
pub mod filter;
pub mod message;
pub mod page;
pub mod records;

pub use error::Error;

// Re-export commonly used types at crate root
pub use document::{
    document_cache_id, CollectionShape, OperationDescriptor, OperationKind, SelectionShape,
    VariableDef, VariableSchema, VariableType, CONFIGURATION_SUBSCRIPTION,
    CONFIGURATION_SUBSCRIPTION_TEXT,
};
pub use filter::PageFilter;
pub use message::{
    ConfigurationData, ConfigurationPayload, ConfigurationVariables, OperationRequest,
    APPLICATION_SELECTOR, FILTER_SELECTOR, PATTERN_SELECTOR,
};
pub use page::{Page, PageMeta};
pub use records::{
    parse_timestamp, ApplicationResult, Entity, FilterResult, NullString, PatternResult,
    Visibility,
};

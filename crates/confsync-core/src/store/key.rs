//! Collection keys.

use std::fmt;

use confsync_proto::PageFilter;
use serde_json::Value;

/// Identifies one cached page: a collection name plus the selector that
/// produced it.
///
/// Pages fetched with different selectors live under different keys, so a
/// snapshot of page 2 never evicts rows cached for page 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    collection: String,
    selector: String,
}

impl CollectionKey {
    /// Create a key from a collection name and a canonical selector string.
    pub fn new(collection: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            selector: selector.into(),
        }
    }

    /// Key for a collection without a selector.
    pub fn unscoped(collection: impl Into<String>) -> Self {
        Self::new(collection, "")
    }

    /// Key for a collection page selected by a `PageFilter`.
    pub fn for_filter(collection: impl Into<String>, filter: &PageFilter) -> Self {
        Self::for_selector(collection, &filter.to_value())
    }

    /// Key for a collection page selected by an arbitrary JSON selector.
    ///
    /// `serde_json` maps keep their keys sorted, so equal selectors always
    /// serialize to the same string.
    pub fn for_selector(collection: impl Into<String>, selector: &Value) -> Self {
        let selector = match selector {
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Self::new(collection, selector)
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Canonical selector string; empty when unscoped.
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.selector.is_empty() {
            f.write_str(&self.collection)
        } else {
            write!(f, "{}{}", self.collection, self.selector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_selectors_produce_equal_keys() {
        let a = CollectionKey::for_selector("patterns", &json!({"page": "1", "pageSize": "10"}));
        let b = CollectionKey::for_selector("patterns", &json!({"pageSize": "10", "page": "1"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_filter_key_differs_per_page() {
        let one = CollectionKey::for_filter("filters", &PageFilter::new(1, 10));
        let two = CollectionKey::for_filter("filters", &PageFilter::new(2, 10));
        assert_ne!(one, two);
        assert_eq!(one.collection(), "filters");
    }

    #[test]
    fn test_display() {
        assert_eq!(CollectionKey::unscoped("applications").to_string(), "applications");
        let key = CollectionKey::for_selector("applications", &json!({"page": "1"}));
        assert_eq!(key.to_string(), r#"applications{"page":"1"}"#);
    }
}

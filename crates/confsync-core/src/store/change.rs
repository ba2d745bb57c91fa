//! Change descriptors produced by applying a snapshot.

use serde::{Deserialize, Serialize};

/// Ids that changed between two snapshots of the same collection key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Ids present now but not before, in snapshot order.
    pub added: Vec<String>,
    /// Ids present in both snapshots and reported as changed, in snapshot order.
    pub updated: Vec<String>,
    /// Ids present before but not now, in previous-snapshot order.
    pub removed: Vec<String>,
}

impl ChangeSet {
    /// An empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed ids.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// Check whether an id appears anywhere in this change set.
    pub fn touches(&self, id: &str) -> bool {
        self.added
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .any(|changed| changed == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let changes = ChangeSet::new();
        assert!(changes.is_empty());
        assert_eq!(changes.len(), 0);
    }

    #[test]
    fn test_touches() {
        let changes = ChangeSet {
            added: vec!["a".into()],
            updated: vec![],
            removed: vec!["b".into()],
        };
        assert!(changes.touches("a"));
        assert!(changes.touches("b"));
        assert!(!changes.touches("c"));
        assert_eq!(changes.len(), 2);
    }
}

//! Paginated response envelopes.

use serde::{Deserialize, Deserializer, Serialize};

/// Pagination envelope of a page snapshot, without its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PageMeta {
    /// Page number as reported by the server.
    pub page: u64,
    /// Page size as reported by the server.
    pub page_size: u64,
    /// Total number of rows in the collection.
    pub total_count: u64,
}

/// One page of a collection.
///
/// Rows are nullable: a `None` row is one the server failed to resolve.
/// On the wire the rows live under a collection-specific field
/// (`applications`, `patterns`, `filters`); `items` is accepted as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    /// Page number.
    pub page: u64,
    /// Page size.
    pub page_size: u64,
    /// Total number of rows in the collection.
    pub total_count: u64,
    /// Rows in server order.
    #[serde(
        rename = "items",
        alias = "applications",
        alias = "patterns",
        alias = "filters",
        default,
        deserialize_with = "nullable_rows"
    )]
    pub items: Vec<Option<T>>,
}

impl<T> Page<T> {
    /// Create a page with the given envelope and rows.
    pub fn new(page: u64, page_size: u64, total_count: u64, items: Vec<Option<T>>) -> Self {
        Self {
            page,
            page_size,
            total_count,
            items,
        }
    }

    /// Create a page where every row resolved.
    pub fn from_rows(page: u64, page_size: u64, total_count: u64, rows: Vec<T>) -> Self {
        Self::new(page, page_size, total_count, rows.into_iter().map(Some).collect())
    }

    /// The envelope of this page.
    pub fn meta(&self) -> PageMeta {
        PageMeta {
            page: self.page,
            page_size: self.page_size,
            total_count: self.total_count,
        }
    }

    /// Iterate over the rows that resolved.
    pub fn rows(&self) -> impl Iterator<Item = &T> {
        self.items.iter().flatten()
    }

    /// Number of rows the server failed to resolve.
    pub fn failed_rows(&self) -> usize {
        self.items.iter().filter(|row| row.is_none()).count()
    }

    /// Number of rows, including failed ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check whether the page carries no rows.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check whether this is the last page of the collection.
    ///
    /// Page numbers may be zero- or one-based depending on the server, so
    /// this compares the rows seen so far against `total_count`.
    pub fn is_last_page(&self) -> bool {
        let seen = self.page.max(1).saturating_mul(self.page_size);
        seen >= self.total_count
    }

    /// Check that `total_count` covers the rows on this page.
    pub fn count_is_consistent(&self) -> bool {
        self.total_count >= self.items.len() as u64
    }
}

fn nullable_rows<'de, D, T>(deserializer: D) -> Result<Vec<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<Option<T>>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

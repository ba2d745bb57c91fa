//! Page selectors sent as subscription variables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Field names accepted inside a `PageFilter` input object.
pub const PAGE_FILTER_FIELDS: &[&str] = &[
    "page",
    "pageSize",
    "order",
    "search",
    "from",
    "to",
    "updated_after",
];

/// Selector for one page of a paginated collection.
///
/// `page` and `page_size` travel as decimal-integer strings, matching the
/// server's `PageFilter` input type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageFilter {
    /// One-based page number.
    pub page: String,
    /// Number of rows per page.
    #[serde(rename = "pageSize")]
    pub page_size: String,
    /// Sort expression, e.g. `updated_at desc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    /// Free-text search term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Lower bound of the creation window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Upper bound of the creation window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Only rows updated after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_after: Option<String>,
}

impl PageFilter {
    /// Create a selector for the given page and page size.
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: page.to_string(),
            page_size: page_size.to_string(),
            order: None,
            search: None,
            from: None,
            to: None,
            updated_after: None,
        }
    }

    /// Set the sort order.
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Set the search term.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Set the creation window.
    pub fn with_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }

    /// Only select rows updated after the given instant.
    pub fn with_updated_after(mut self, updated_after: impl Into<String>) -> Self {
        self.updated_after = Some(updated_after.into());
        self
    }

    /// Parsed page number.
    pub fn page_number(&self) -> Result<u64, Error> {
        parse_positive("page", &self.page)
    }

    /// Parsed page size.
    pub fn page_size_number(&self) -> Result<u64, Error> {
        parse_positive("pageSize", &self.page_size)
    }

    /// Check the page/page size invariants.
    pub fn validate(&self) -> Result<(), Error> {
        self.page_number()?;
        self.page_size_number()?;
        Ok(())
    }

    /// Decode and validate a selector from a JSON variable value.
    ///
    /// `name` is the variable name and prefixes field paths in errors.
    pub fn from_variable(name: &str, value: &Value) -> Result<Self, Error> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_variables(name, "expected a PageFilter object"))?;

        for key in object.keys() {
            if !PAGE_FILTER_FIELDS.contains(&key.as_str()) {
                return Err(Error::invalid_variables(
                    format!("{}.{}", name, key),
                    "unknown PageFilter field",
                ));
            }
        }

        for required in ["page", "pageSize"] {
            match object.get(required) {
                None | Some(Value::Null) => {
                    return Err(Error::invalid_variables(
                        format!("{}.{}", name, required),
                        "required field is missing",
                    ));
                }
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(Error::invalid_variables(
                        format!("{}.{}", name, required),
                        "expected a decimal-integer string",
                    ));
                }
            }
        }

        for optional in ["order", "search", "from", "to", "updated_after"] {
            match object.get(optional) {
                None | Some(Value::Null) | Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(Error::invalid_variables(
                        format!("{}.{}", name, optional),
                        "expected a string",
                    ));
                }
            }
        }

        let filter: PageFilter = serde_json::from_value(value.clone())
            .map_err(|e| Error::invalid_variables(name, e.to_string()))?;
        filter.validate().map_err(|e| e.within(name))?;
        Ok(filter)
    }

    /// Encode this selector as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Default for PageFilter {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

fn parse_positive(field: &str, raw: &str) -> Result<u64, Error> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_variables(
            field,
            format!("expected a decimal-integer string, got {:?}", raw),
        ));
    }
    let value: u64 = raw
        .parse()
        .map_err(|_| Error::invalid_variables(field, format!("out of range: {}", raw)))?;
    if value == 0 {
        return Err(Error::invalid_variables(field, "must be at least 1"));
    }
    Ok(value)
}

//! Subscription requests, variables and payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::filter::PageFilter;
use crate::page::Page;
use crate::records::{ApplicationResult, FilterResult, PatternResult};

/// Variable name of the applications selector.
pub const APPLICATION_SELECTOR: &str = "applicationSelector";
/// Variable name of the patterns selector.
pub const PATTERN_SELECTOR: &str = "patternSelector";
/// Variable name of the filters selector.
pub const FILTER_SELECTOR: &str = "filterSelector";

/// A request to open an upstream subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Operation name.
    #[serde(rename = "operationName")]
    pub operation_name: String,
    /// Document text sent to the server.
    pub query: String,
    /// Variables, already validated.
    pub variables: Map<String, Value>,
}

impl OperationRequest {
    /// Create a new request.
    pub fn new(
        operation_name: impl Into<String>,
        query: impl Into<String>,
        variables: Map<String, Value>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            query: query.into(),
            variables,
        }
    }

    /// Encode as a JSON request body.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Variables of the `ConfigurationSubscription` operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ConfigurationVariables {
    #[serde(rename = "applicationSelector")]
    pub application_selector: PageFilter,
    #[serde(rename = "patternSelector")]
    pub pattern_selector: PageFilter,
    #[serde(rename = "filterSelector")]
    pub filter_selector: PageFilter,
}

impl ConfigurationVariables {
    /// Use the same selector for all three collections.
    pub fn uniform(selector: PageFilter) -> Self {
        Self {
            application_selector: selector.clone(),
            pattern_selector: selector.clone(),
            filter_selector: selector,
        }
    }

    /// Set the applications selector.
    pub fn with_applications(mut self, selector: PageFilter) -> Self {
        self.application_selector = selector;
        self
    }

    /// Set the patterns selector.
    pub fn with_patterns(mut self, selector: PageFilter) -> Self {
        self.pattern_selector = selector;
        self
    }

    /// Set the filters selector.
    pub fn with_filters(mut self, selector: PageFilter) -> Self {
        self.filter_selector = selector;
        self
    }

    /// Convert to a JSON variables map.
    pub fn to_variables(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(APPLICATION_SELECTOR.into(), self.application_selector.to_value());
        map.insert(PATTERN_SELECTOR.into(), self.pattern_selector.to_value());
        map.insert(FILTER_SELECTOR.into(), self.filter_selector.to_value());
        map
    }

    /// Decode and validate from a JSON variables map.
    pub fn from_variables(variables: &Map<String, Value>) -> Result<Self, Error> {
        let selector = |name: &str| -> Result<PageFilter, Error> {
            let value = variables
                .get(name)
                .ok_or_else(|| Error::invalid_variables(name, "required variable is missing"))?;
            PageFilter::from_variable(name, value)
        };

        Ok(Self {
            application_selector: selector(APPLICATION_SELECTOR)?,
            pattern_selector: selector(PATTERN_SELECTOR)?,
            filter_selector: selector(FILTER_SELECTOR)?,
        })
    }
}

/// The `configuration` object of a subscription payload.
///
/// Each sub-result is independently paginated and may be null when the
/// server failed to resolve it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigurationData {
    #[serde(default)]
    pub applications: Option<Page<ApplicationResult>>,
    #[serde(default)]
    pub patterns: Option<Page<PatternResult>>,
    #[serde(default)]
    pub filters: Option<Page<FilterResult>>,
}

/// A full `ConfigurationSubscription` payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigurationPayload {
    pub configuration: ConfigurationData,
}

impl ConfigurationPayload {
    /// Decode a payload.
    ///
    /// Accepts both the bare `{configuration: ...}` object and a GraphQL
    /// response envelope `{data: {configuration: ...}}`.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let value = match value {
            Value::Object(mut object) if !object.contains_key("configuration") => {
                match object.remove("data") {
                    Some(data) => data,
                    None => Value::Object(object),
                }
            }
            other => other,
        };

        serde_json::from_value(value).map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}

//! Compiled operation descriptors.
//!
//! A descriptor bundles the document text with what the client needs to
//! check variables before anything reaches the transport and to find the
//! paginated collections inside a payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::filter::PageFilter;
use crate::message::{APPLICATION_SELECTOR, FILTER_SELECTOR, PATTERN_SELECTOR};

/// Name of the configuration subscription operation.
pub const CONFIGURATION_SUBSCRIPTION: &str = "ConfigurationSubscription";

/// Document text of the configuration subscription.
pub const CONFIGURATION_SUBSCRIPTION_TEXT: &str = r#"subscription ConfigurationSubscription(
  $applicationSelector: PageFilter!
  $patternSelector: PageFilter!
  $filterSelector: PageFilter!
) {
  configuration: subscribeConfiguration(applicationSelector: $applicationSelector, patternSelector: $patternSelector, filterSelector: $filterSelector) {
    applications {
      page
      page_size
      total_count
      applications {
        id
        name
        application_file
        type {
          String
          Valid
        }
        user_id
        visibility
        created_at
        updated_at
      }
    }
    patterns {
      page
      page_size
      total_count
      patterns {
        id
        name
        user_id
        pattern_file
        visibility
        catalog_data
        canSupport
        errmsg
        created_at
        updated_at
      }
    }
    filters {
      page
      page_size
      total_count
      filters {
        id
        name
        filter_file
        visibility
        catalog_data
        user_id
        created_at
        updated_at
      }
    }
  }
}
"#;

/// Kind of GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// Input type of an operation variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    /// A `PageFilter` input object.
    PageFilter,
    /// A plain string.
    String,
}

/// Definition of one operation variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub ty: VariableType,
    pub required: bool,
}

impl VariableDef {
    /// A required variable.
    pub fn required(name: impl Into<String>, ty: VariableType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    /// An optional variable.
    pub fn optional(name: impl Into<String>, ty: VariableType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }

    fn validate(&self, value: Option<&Value>) -> Result<(), Error> {
        let value = match value {
            None | Some(Value::Null) if self.required => {
                return Err(Error::invalid_variables(
                    &self.name,
                    "required variable is missing",
                ));
            }
            None | Some(Value::Null) => return Ok(()),
            Some(value) => value,
        };

        match self.ty {
            VariableType::PageFilter => PageFilter::from_variable(&self.name, value).map(|_| ()),
            VariableType::String if value.is_string() => Ok(()),
            VariableType::String => Err(Error::invalid_variables(&self.name, "expected a string")),
        }
    }

    /// Canonical form of a present, non-null value.
    pub fn canonical(&self, value: &Value) -> Result<Value, Error> {
        match self.ty {
            VariableType::PageFilter => {
                PageFilter::from_variable(&self.name, value).map(|filter| filter.to_value())
            }
            VariableType::String => Ok(value.clone()),
        }
    }
}

/// Ordered variable definitions of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableSchema {
    pub variables: Vec<VariableDef>,
}

impl VariableSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable definition.
    pub fn with_variable(mut self, def: VariableDef) -> Self {
        self.variables.push(def);
        self
    }

    /// Look up a variable definition by name.
    pub fn get(&self, name: &str) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Check a variables bundle against this schema.
    ///
    /// Rejects unknown variables, missing required ones, and values of the
    /// wrong shape.
    pub fn validate(&self, variables: &Map<String, Value>) -> Result<(), Error> {
        for name in variables.keys() {
            if self.get(name).is_none() {
                return Err(Error::invalid_variables(name, "unknown variable"));
            }
        }
        for def in &self.variables {
            def.validate(variables.get(&def.name))?;
        }
        Ok(())
    }

    /// Validate a bundle and rewrite it into canonical form.
    ///
    /// Null optional values are dropped and `PageFilter` selectors lose
    /// explicit nulls, so equivalent bundles compare equal.
    pub fn canonicalize(&self, variables: &Map<String, Value>) -> Result<Map<String, Value>, Error> {
        self.validate(variables)?;

        let mut canonical = Map::new();
        for def in &self.variables {
            match variables.get(&def.name) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    canonical.insert(def.name.clone(), def.canonical(value)?);
                }
            }
        }
        Ok(canonical)
    }
}

/// Location of one paginated collection inside a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionShape {
    /// Field of the root object holding the page envelope.
    pub field: String,
    /// Variable that selects this collection's page, if any.
    pub selector: Option<String>,
}

impl CollectionShape {
    /// A collection under `field` of the root object.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            selector: None,
        }
    }

    /// Set the selector variable.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// Shape of an operation's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionShape {
    /// Root response field (after aliasing).
    pub root: String,
    /// Paginated collections under the root.
    pub collections: Vec<CollectionShape>,
}

impl SelectionShape {
    /// Create a shape with the given root field.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            collections: Vec::new(),
        }
    }

    /// Add a collection.
    pub fn with_collection(mut self, collection: CollectionShape) -> Self {
        self.collections.push(collection);
        self
    }

    /// Look up a collection by field name.
    pub fn collection(&self, field: &str) -> Option<&CollectionShape> {
        self.collections.iter().find(|c| c.field == field)
    }
}

/// A compiled operation: its name, text, variable schema and response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub kind: OperationKind,
    pub text: String,
    pub variables: VariableSchema,
    pub selection: SelectionShape,
    /// Hex blake3 digest of `text`.
    pub cache_id: String,
}

impl OperationDescriptor {
    /// Create a descriptor; the cache id is derived from the text.
    pub fn new(
        name: impl Into<String>,
        kind: OperationKind,
        text: impl Into<String>,
        variables: VariableSchema,
        selection: SelectionShape,
    ) -> Self {
        let text = text.into();
        let cache_id = document_cache_id(&text);
        Self {
            name: name.into(),
            kind,
            text,
            variables,
            selection,
            cache_id,
        }
    }

    /// The built-in `ConfigurationSubscription` descriptor.
    pub fn configuration_subscription() -> Self {
        let variables = VariableSchema::new()
            .with_variable(VariableDef::required(APPLICATION_SELECTOR, VariableType::PageFilter))
            .with_variable(VariableDef::required(PATTERN_SELECTOR, VariableType::PageFilter))
            .with_variable(VariableDef::required(FILTER_SELECTOR, VariableType::PageFilter));

        let selection = SelectionShape::new("configuration")
            .with_collection(CollectionShape::new("applications").with_selector(APPLICATION_SELECTOR))
            .with_collection(CollectionShape::new("patterns").with_selector(PATTERN_SELECTOR))
            .with_collection(CollectionShape::new("filters").with_selector(FILTER_SELECTOR));

        Self::new(
            CONFIGURATION_SUBSCRIPTION,
            OperationKind::Subscription,
            CONFIGURATION_SUBSCRIPTION_TEXT,
            variables,
            selection,
        )
    }
}

/// Compute the cache id of a document text.
pub fn document_cache_id(text: &str) -> String {
    let digest = blake3::hash(text.as_bytes());
    hex::encode(&digest.as_bytes()[..16])
}

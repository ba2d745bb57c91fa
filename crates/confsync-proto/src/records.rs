//! Typed rows of the configuration collections.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A row that can be normalized by id.
pub trait Entity {
    /// Collection name used on the wire (`applications`, `patterns`, `filters`).
    const COLLECTION: &'static str;

    /// Identifier, unique within the collection.
    fn id(&self) -> &str;
}

/// A nullable string carried as a `{String, Valid}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NullString {
    /// The string value; meaningless when `valid` is false.
    #[serde(rename = "String", default)]
    pub string: String,
    /// Whether `string` holds a value.
    #[serde(rename = "Valid", default)]
    pub valid: bool,
}

impl NullString {
    /// A present value.
    pub fn some(value: impl Into<String>) -> Self {
        Self {
            string: value.into(),
            valid: true,
        }
    }

    /// An absent value.
    pub fn none() -> Self {
        Self::default()
    }

    /// The value, if valid.
    pub fn as_option(&self) -> Option<&str> {
        if self.valid {
            Some(&self.string)
        } else {
            None
        }
    }
}

impl From<Option<String>> for NullString {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => Self::some(s),
            None => Self::none(),
        }
    }
}

/// Who can see a stored design.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Visibility {
    /// Only the owner.
    #[default]
    Private,
    /// Anyone with access to the server.
    Public,
    /// Published to the catalog.
    Published,
    /// A value this client does not know about.
    Other(String),
}

impl Visibility {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
            Visibility::Published => "published",
            Visibility::Other(s) => s,
        }
    }
}

impl From<String> for Visibility {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "private" => Visibility::Private,
            "public" => Visibility::Public,
            "published" => Visibility::Published,
            _ => Visibility::Other(value),
        }
    }
}

impl From<Visibility> for String {
    fn from(value: Visibility) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a server timestamp.
///
/// Accepts RFC 3339 and the space-separated `YYYY-MM-DD HH:MM:SS[.f]` form
/// (interpreted as UTC). Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

macro_rules! timestamps {
    ($ty:ty) => {
        impl $ty {
            /// Creation time, when present and parseable.
            pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
                self.created_at.as_deref().and_then(parse_timestamp)
            }

            /// Last update time, when present and parseable.
            pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
                self.updated_at.as_deref().and_then(parse_timestamp)
            }
        }
    };
}

/// A stored application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Serialized application content.
    #[serde(default)]
    pub application_file: String,
    /// Source type of the application (e.g. `Helm Chart`).
    #[serde(rename = "type", default)]
    pub application_type: NullString,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

timestamps!(ApplicationResult);

impl Entity for ApplicationResult {
    const COLLECTION: &'static str = "applications";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A stored design pattern.
///
/// A pattern the server cannot deploy carries `can_support == false` and
/// usually an `errmsg`. That is data, not a subscription failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: String,
    /// Serialized pattern content.
    #[serde(default)]
    pub pattern_file: String,
    #[serde(default)]
    pub visibility: Visibility,
    /// Opaque catalog metadata.
    #[serde(default)]
    pub catalog_data: Option<Value>,
    #[serde(rename = "canSupport", default)]
    pub can_support: bool,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

timestamps!(PatternResult);

impl PatternResult {
    /// Whether the server can deploy this pattern.
    pub fn is_supported(&self) -> bool {
        self.can_support
    }

    /// Server diagnostic for this row, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        self.errmsg.as_deref().filter(|msg| !msg.is_empty())
    }
}

impl Entity for PatternResult {
    const COLLECTION: &'static str = "patterns";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A stored filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Serialized filter content.
    #[serde(default)]
    pub filter_file: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub catalog_data: Option<Value>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

timestamps!(FilterResult);

impl Entity for FilterResult {
    const COLLECTION: &'static str = "filters";

    fn id(&self) -> &str {
        &self.id
    }
}

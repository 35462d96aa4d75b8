//! Schema-less publication record and its natural key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Resolver prefixes stripped from DOIs before they are used as identity
const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// A publication as returned by a publisher search or lookup call
///
/// The field set is whatever the publisher returned; it is carried through
/// untouched. Only the handful of fields the harvester itself depends on get
/// typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, returning `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Set a field, returning the record for chaining
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Raw access to a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A field rendered as a string, if it is a string or a number
    pub fn str_field(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The natural key stored under `field`, if present and non-empty
    pub fn natural_key(&self, field: &str) -> Option<NaturalKey> {
        self.str_field(field).and_then(NaturalKey::new)
    }

    pub fn title(&self) -> Option<String> {
        self.str_field("title")
    }

    pub fn content_type(&self) -> Option<String> {
        self.str_field("contentType")
    }

    pub fn language(&self) -> Option<String> {
        self.str_field("language")
    }

    /// Publication date, falling back to the cover date ScienceDirect reports
    pub fn publication_date(&self) -> Option<String> {
        self.str_field("publicationDate")
            .or_else(|| self.str_field("coverDate"))
            .or_else(|| self.str_field("prism:coverDate"))
    }

    /// Genre tags; a single string is treated as a one-element list
    pub fn genres(&self) -> Vec<String> {
        match self.fields.get("genre") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Publisher-assigned identifier (a DOI) used for dedup and merge
///
/// Comparison ignores ASCII case because DOIs are case-insensitive; the
/// spelling first supplied is the one that gets displayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
    /// Normalize a raw identifier; `None` if nothing is left after trimming
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let mut key = raw.as_ref().trim();
        for prefix in DOI_PREFIXES {
            let matches = key
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
            if matches {
                key = key[prefix.len()..].trim_start();
                break;
            }
        }

        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for NaturalKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for NaturalKey {}

impl Hash for NaturalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub mod memory;
pub mod file;

#[cfg(feature = "dynamodb-backend")]
pub mod dynamo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{DocsessionError, StoreError};

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

/// A single field value inside a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values for filtering.
    ///
    /// Only like-typed values are ordered, except that a timestamp also
    /// orders against text holding a parseable timestamp and against an
    /// integer read as Unix seconds. Everything else, `Null` included, is
    /// unordered and never matches a filter.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(_), _) => other.compare(self).map(Ordering::reverse),
            (FieldValue::Text(a), FieldValue::Timestamp(b)) => {
                crate::util::parse_timestamp(a).map(|a| a.cmp(b))
            }
            (FieldValue::Integer(a), FieldValue::Timestamp(b)) => {
                DateTime::from_timestamp(*a, 0).map(|a| a.cmp(b))
            }
            _ => None,
        }
    }

    /// The point in time this value denotes, if any.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            FieldValue::Text(s) => crate::util::parse_timestamp(s),
            FieldValue::Integer(secs) => DateTime::from_timestamp(*secs, 0),
            FieldValue::Null => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(t)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        v.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }
}

/// A flat document: field name to value.
pub type Document = BTreeMap<String, FieldValue>;

/// Comparison operators supported by [`DocumentStore::query_documents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    LessOrEqual,
}

impl FilterOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::LessOrEqual => "<=",
        }
    }
}

/// A single-field filter, e.g. `last_activity <= cutoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl FieldFilter {
    pub fn less_or_equal(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::LessOrEqual,
            value: value.into(),
        }
    }

    /// Whether `doc` passes this filter. Documents missing the field never do.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(value) = doc.get(&self.field) else {
            return false;
        };
        match (self.op, value.compare(&self.value)) {
            (FilterOp::LessOrEqual, Some(ord)) => ord != Ordering::Greater,
            (_, None) => false,
        }
    }
}

/// External document database, addressed by collection and document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name (e.g., "memory", "file", "dynamodb").
    fn name(&self) -> &str;

    /// Fetch a document. `Ok(None)` when it does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Replace the document with `fields` (no merge).
    async fn set_document(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Return up to `limit` documents matching `filter`, as `(id, fields)`.
    async fn query_documents(
        &self,
        collection: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<(String, Document)>, StoreError>;
}

/// Build the document store selected by `config`.
pub async fn open_store(config: &BackendConfig) -> Result<Arc<dyn DocumentStore>, DocsessionError> {
    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        BackendKind::File => {
            let store = FileDocumentStore::new(config.data_path())?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "dynamodb-backend")]
        BackendKind::Dynamodb => Ok(Arc::new(dynamo::DynamoDocumentStore::from_env().await)),
        #[cfg(not(feature = "dynamodb-backend"))]
        BackendKind::Dynamodb => Err(crate::error::ConfigError::Invalid(
            "dynamodb backend requires the `dynamodb-backend` feature".to_string(),
        )
        .into()),
    }
}

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Document, DocumentStore, FieldFilter};
use crate::error::StoreError;

/// In-process document store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, DashMap<String, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).map(|d| d.value().clone())))
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(c) = self.collections.get(collection) {
            c.remove(id);
        }
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let Some(c) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(c.iter()
            .filter(|entry| filter.matches(entry.value()))
            .take(limit)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

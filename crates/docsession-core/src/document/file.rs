use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Document, DocumentStore, FieldFilter};
use crate::error::StoreError;
use crate::util::safe_filename;

/// On-disk shape of one document.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    id: String,
    fields: Document,
}

/// File-based document store: `<root>/<collection>/<encoded id>.json`.
///
/// Ids are base64url-encoded into file names so that any id maps to exactly
/// one file. Each write lands in its own temp file in the collection directory
/// and is renamed into place, so concurrent writers to one id never see a
/// partial document and the last rename wins.
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StoreError> {
        let name = safe_filename(collection);
        if name.is_empty() || name == "." || name == ".." {
            return Err(StoreError::InvalidId(format!("collection {:?}", collection)));
        }
        Ok(self.root.join(name))
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId("empty document id".to_string()));
        }
        let file = format!("{}.json", URL_SAFE_NO_PAD.encode(id.as_bytes()));
        Ok(self.collection_dir(collection)?.join(file))
    }

    async fn load(path: &Path) -> Result<Option<StoredDocument>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let path = self.document_path(collection, id)?;
        Ok(Self::load(&path).await?.map(|stored| stored.fields))
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        let dir = self.collection_dir(collection)?;
        let path = self.document_path(collection, id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let stored = StoredDocument {
            id: id.to_string(),
            fields,
        };
        let json = serde_json::to_vec(&stored)?;

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("file write task failed: {}", e)))??;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let path = self.document_path(collection, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn query_documents(
        &self,
        collection: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut matched = Vec::new();
        while matched.len() < limit {
            let Some(entry) = entries.next_entry().await? else {
                break;
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            // A concurrent delete between listing and reading is not an error.
            let stored = match Self::load(&path).await {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable document {}: {}", path.display(), e);
                    continue;
                }
            };

            if filter.matches(&stored.fields) {
                matched.push((stored.id, stored.fields));
            }
        }

        debug!(
            "file query {} {} {:?} -> {} match(es)",
            filter.field,
            filter.op.symbol(),
            filter.value,
            matched.len()
        );
        Ok(matched)
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::context::AppContext;
use crate::document::{DocumentStore, FieldFilter};
use crate::error::Result;
use crate::record::{self, ActivityStamp, FIELD_LAST_ACTIVITY};

/// The lifecycle a web framework drives a session backend through.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Prepare the backend. `save_path` and `name` come from the framework.
    async fn open(&self, save_path: &str, name: &str) -> Result<bool>;

    /// Release the backend.
    async fn close(&self) -> Result<bool>;

    /// Stored session data, or empty if the session is missing or expired.
    async fn read(&self, session_id: &str) -> Result<Vec<u8>>;

    /// Replace the stored session data.
    async fn write(&self, session_id: &str, data: &[u8]) -> Result<bool>;

    /// Remove a session. Succeeds whether or not it existed.
    async fn destroy(&self, session_id: &str) -> Result<bool>;

    /// Delete one batch of sessions idle for at least `lifetime_secs`.
    /// Returns how many were deleted.
    async fn gc(&self, lifetime_secs: u64) -> Result<usize>;
}

/// Session handler that keeps one document per session in a [`DocumentStore`].
pub struct DocumentSessionHandler {
    store: Arc<dyn DocumentStore>,
    collection: String,
    lifetime_minutes: u64,
    gc_batch_size: usize,
    context: AppContext,
    clock: Arc<dyn Clock>,
}

impl DocumentSessionHandler {
    /// Settings are read from `config` once, here.
    pub fn new(store: Arc<dyn DocumentStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            collection: config.table.clone(),
            lifetime_minutes: config.lifetime,
            gc_batch_size: config.gc_batch_size,
            context: AppContext::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Most documents a single `gc` call deletes.
    pub fn gc_batch_size(&self) -> usize {
        self.gc_batch_size
    }

    /// Configured session lifetime, in seconds.
    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_minutes.saturating_mul(60)
    }
}

#[async_trait]
impl SessionHandler for DocumentSessionHandler {
    async fn open(&self, _save_path: &str, _name: &str) -> Result<bool> {
        Ok(true)
    }

    async fn close(&self) -> Result<bool> {
        Ok(true)
    }

    async fn read(&self, session_id: &str) -> Result<Vec<u8>> {
        let doc = self
            .store
            .get_document(&self.collection, session_id)
            .await?
            .unwrap_or_default();

        let stamp = ActivityStamp::from_document(&doc);
        if stamp == ActivityStamp::Malformed {
            warn!("Session {} has an unreadable last_activity; it will not expire", session_id);
        }
        if stamp.is_expired(self.clock.now(), self.lifetime_minutes) {
            debug!("Session {} expired", session_id);
            return Ok(Vec::new());
        }

        Ok(record::decode_payload(&doc, session_id))
    }

    async fn write(&self, session_id: &str, data: &[u8]) -> Result<bool> {
        let doc = record::build_record(data, self.clock.now(), &self.context);
        self.store
            .set_document(&self.collection, session_id, doc)
            .await?;
        Ok(true)
    }

    async fn destroy(&self, session_id: &str) -> Result<bool> {
        self.store
            .delete_document(&self.collection, session_id)
            .await?;
        Ok(true)
    }

    async fn gc(&self, lifetime_secs: u64) -> Result<usize> {
        let now = self.clock.now();
        let cutoff = i64::try_from(lifetime_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_sub_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let filter = FieldFilter::less_or_equal(FIELD_LAST_ACTIVITY, cutoff);

        let stale = self
            .store
            .query_documents(&self.collection, &filter, self.gc_batch_size)
            .await?;

        let mut deleted = 0;
        for (id, _) in stale {
            self.store.delete_document(&self.collection, &id).await?;
            deleted += 1;
        }

        if deleted > 0 {
            info!(
                "gc removed {} session(s) from {} idle since {}",
                deleted, self.collection, cutoff
            );
        }
        Ok(deleted)
    }
}

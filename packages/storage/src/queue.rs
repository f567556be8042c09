//! Queue lifecycle: create-or-update, lookup, listing, stats, and cascade
//! delete.

use std::sync::Arc;

use qcore::{ClockSource, Document, Id};
use tracing::debug;

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::message::MessageController;
use crate::store::{DocumentStore, QueueDoc};

/// Message-count breakdown returned by [`QueueController::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueMessageStats {
    pub claimed: u64,
    pub free: u64,
}

/// A queue's point-in-time statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub messages: QueueMessageStats,
    /// Reserved for future action-log accounting; this store keeps none.
    pub actions: u64,
}

/// Operations over the `queues` collection.
pub struct QueueController<S> {
    store: Arc<S>,
    config: Arc<CoreConfig>,
    clock: Arc<dyn ClockSource>,
}

impl<S: DocumentStore> QueueController<S> {
    pub fn new(store: Arc<S>, config: Arc<CoreConfig>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Creates the queue if it does not exist, or replaces its metadata if it
    /// does. Returns `true` iff a new queue was created.
    pub async fn upsert(
        &self,
        project: Option<&str>,
        name: &str,
        metadata: Document,
    ) -> Result<bool> {
        let created = self.store.queue_upsert(project, name, metadata).await?;
        debug!(project, name, created, "queue upsert");
        Ok(created)
    }

    /// Looks up a queue by name, failing if it does not exist.
    pub async fn get(&self, project: Option<&str>, name: &str) -> Result<QueueDoc> {
        self.store
            .queue_get(project, name)
            .await?
            .ok_or_else(|| Error::QueueDoesNotExist {
                name: name.to_string(),
                project: project.map(str::to_string),
            })
    }

    /// Resolves a queue name to its internal id. Every message/claim
    /// operation goes through this first.
    pub async fn resolve_id(&self, project: Option<&str>, name: &str) -> Result<Id> {
        Ok(self.get(project, name).await?.qid)
    }

    /// Deletes a queue and every message it contains.
    ///
    /// The purge and the queue-document removal are two separate store
    /// calls, not one atomic transaction: a crash between them leaves an
    /// orphaned empty queue document rather than orphaned messages, which is
    /// the safer direction to fail in. The purge itself goes through the
    /// message controller rather than the store directly, so it stays a
    /// named message-controller operation rather than a queue-layer
    /// shortcut.
    pub async fn delete(
        &self,
        project: Option<&str>,
        name: &str,
        messages: &MessageController<S>,
    ) -> Result<()> {
        if let Some(doc) = self.store.queue_get(project, name).await? {
            let purged = messages.purge_queue(doc.qid).await;
            debug!(project, name, purged, "queue delete cascaded to messages");
        }
        self.store.queue_delete(project, name).await?;
        Ok(())
    }

    /// Lists queues in a project, paginated by name.
    ///
    /// `detailed = false` strips each queue's metadata document so callers
    /// that only want names pay no cost for carrying it across the wire.
    pub async fn list(
        &self,
        project: Option<&str>,
        marker: Option<&str>,
        limit: Option<usize>,
        detailed: bool,
    ) -> Result<Vec<QueueDoc>> {
        let limit = limit.unwrap_or(self.config.default_list_limit);
        let docs = self.store.queue_list(project, marker, limit).await?;
        Ok(if detailed {
            docs
        } else {
            docs.into_iter()
                .map(|doc| QueueDoc {
                    metadata: Document::Null,
                    ..doc
                })
                .collect()
        })
    }

    /// Reports a queue's current message counts: how many are claimed versus
    /// free to claim.
    pub async fn stats(&self, project: Option<&str>, name: &str) -> Result<QueueStats> {
        let qid = self.resolve_id(project, name).await?;
        let now = self.clock.now_secs();
        let claimed = self
            .store
            .message_claimed(qid, None, now, None)
            .await?
            .len() as u64;
        let free = self
            .store
            .message_active(qid, None, true, None, None, now)
            .await?
            .len() as u64;
        Ok(QueueStats {
            messages: QueueMessageStats { claimed, free },
            actions: 0,
        })
    }
}

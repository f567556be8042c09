//! Message lifecycle: post, fetch, active/consumer listing, and claim-gated
//! delete.

use std::str::FromStr;
use std::sync::Arc;

use qcore::{ClockSource, Document, Id};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::queue::QueueController;
use crate::store::{ClaimRecord, DocumentStore, MessageDoc, NewMessage};

/// Caller-facing projection of a message document, with `age` computed
/// relative to the moment it was read rather than stored.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub id: Id,
    /// Seconds elapsed since the message was created.
    pub age_secs: u64,
    pub ttl_secs: u64,
    pub expires_at: u64,
    pub client_uuid: Option<Uuid>,
    pub claim: ClaimRecord,
    pub body: Document,
}

impl MessageView {
    fn from_doc(doc: MessageDoc, now: u64) -> Self {
        Self {
            age_secs: now.saturating_sub(doc.id.created_at_secs()),
            id: doc.id,
            ttl_secs: doc.ttl_secs,
            expires_at: doc.expires_at,
            client_uuid: doc.client_uuid,
            claim: doc.claim,
            body: doc.body,
        }
    }
}

/// Operations over the `messages` collection, scoped to a single queue per
/// call via `(project, name)`.
pub struct MessageController<S> {
    store: Arc<S>,
    queues: Arc<QueueController<S>>,
    clock: Arc<dyn ClockSource>,
}

impl<S: DocumentStore> MessageController<S> {
    pub fn new(store: Arc<S>, queues: Arc<QueueController<S>>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            store,
            queues,
            clock,
        }
    }

    /// Posts one or more messages, returning their assigned ids in input
    /// order. `client_uuid` identifies the producer for echo suppression.
    pub async fn post(
        &self,
        project: Option<&str>,
        name: &str,
        messages: Vec<NewMessage>,
        client_uuid: Option<Uuid>,
    ) -> Result<Vec<Id>> {
        for message in &messages {
            if message.ttl_secs == 0 {
                return Err(Error::InvalidTtl("message ttl must be greater than zero".into()));
            }
        }
        let qid = self.queues.resolve_id(project, name).await?;
        let now = self.clock.now_secs();
        let ids = self
            .store
            .message_insert(qid, messages, client_uuid, now)
            .await?;
        debug!(project, name, count = ids.len(), "messages posted");
        Ok(ids)
    }

    /// Fetches a single live message by its stringified id.
    ///
    /// A malformed id is treated the same as a missing one: both fail
    /// [`Error::MessageDoesNotExist`].
    pub async fn get(&self, project: Option<&str>, name: &str, id: &str) -> Result<MessageView> {
        let Ok(id) = Id::from_str(id) else {
            return Err(Error::MessageDoesNotExist {
                id: id.to_string(),
                queue: name.to_string(),
            });
        };
        self.get_by_id(project, name, id).await
    }

    async fn get_by_id(&self, project: Option<&str>, name: &str, id: Id) -> Result<MessageView> {
        let qid = self.queues.resolve_id(project, name).await?;
        let now = self.clock.now_secs();
        let doc = self
            .store
            .message_get(qid, id, now)
            .await?
            .ok_or_else(|| Error::MessageDoesNotExist {
                id: id.to_string(),
                queue: name.to_string(),
            })?;
        Ok(MessageView::from_doc(doc, now))
    }

    /// Lists unclaimed, unexpired messages ascending by id, optionally
    /// suppressing a producer's own messages. The candidate-selection
    /// primitive the claim controller builds on; `list` is the
    /// consumer-facing wrapper.
    pub async fn active(
        &self,
        project: Option<&str>,
        name: &str,
        marker: Option<Id>,
        echo: bool,
        client_uuid: Option<Uuid>,
        limit: Option<usize>,
    ) -> Result<Vec<MessageDoc>> {
        let qid = self.queues.resolve_id(project, name).await?;
        let now = self.clock.now_secs();
        Ok(self
            .store
            .message_active(qid, marker, echo, client_uuid, limit, now)
            .await?)
    }

    /// The public consumer view over a queue: builds on [`Self::active`]
    /// with the same echo/marker semantics, returning a page of messages
    /// plus the marker a caller should pass to fetch the next page.
    ///
    /// A queue that does not exist yields an empty page rather than an
    /// error -- a consumer polling a queue that hasn't been created yet
    /// should see "nothing to read", not a failure.
    pub async fn list(
        &self,
        project: Option<&str>,
        name: &str,
        marker: Option<Id>,
        echo: bool,
        client_uuid: Option<Uuid>,
        limit: Option<usize>,
    ) -> Result<(Vec<MessageView>, Option<Id>)> {
        let qid = match self.queues.resolve_id(project, name).await {
            Ok(qid) => qid,
            Err(Error::QueueDoesNotExist { .. }) => return Ok((Vec::new(), None)),
            Err(other) => return Err(other),
        };
        let now = self.clock.now_secs();
        let docs = self
            .store
            .message_active(qid, marker, echo, client_uuid, limit, now)
            .await?;
        let next_marker = docs.last().map(|doc| doc.id);
        let views = docs
            .into_iter()
            .map(|doc| MessageView::from_doc(doc, now))
            .collect();
        Ok((views, next_marker))
    }

    /// Deletes a message by its stringified id.
    ///
    /// If `claim` is `None`, the delete is unconditional (subject to queue
    /// match) regardless of whether the message currently carries a live
    /// claim. If `claim` is supplied, the delete only succeeds when it
    /// names the message's current live claim; otherwise it fails
    /// [`Error::ClaimNotPermitted`]. A malformed message or claim id is
    /// silently treated as "not found" rather than raised as an error, so
    /// retries with a stale id stay idempotent.
    pub async fn delete(
        &self,
        project: Option<&str>,
        name: &str,
        id: &str,
        claim: Option<&str>,
    ) -> Result<()> {
        let Ok(id) = Id::from_str(id) else {
            return Ok(());
        };
        let claim = match claim {
            Some(claim) => match Id::from_str(claim) {
                Ok(claim) => Some(claim),
                Err(_) => return Ok(()),
            },
            None => None,
        };
        self.delete_by_id(project, name, id, claim).await
    }

    async fn delete_by_id(
        &self,
        project: Option<&str>,
        name: &str,
        id: Id,
        claim: Option<Id>,
    ) -> Result<()> {
        let qid = self.queues.resolve_id(project, name).await?;
        let now = self.clock.now_secs();

        match claim {
            Some(claim_id) => {
                let deleted = self
                    .store
                    .message_delete_if_claimed(qid, id, claim_id, now)
                    .await?;
                if !deleted {
                    return Err(Error::ClaimNotPermitted {
                        message: id.to_string(),
                        claim: claim_id.to_string(),
                    });
                }
            }
            None => {
                if self.store.message_get(qid, id, now).await?.is_none() {
                    return Err(Error::MessageDoesNotExist {
                        id: id.to_string(),
                        queue: name.to_string(),
                    });
                }
                self.store.message_delete(qid, id).await;
            }
        }
        debug!(project, name, message = %id, "message deleted");
        Ok(())
    }

    /// Lists messages currently covered by a live claim, ascending by id.
    /// `claim_id = None` matches any claimed message.
    pub(crate) async fn claimed(
        &self,
        qid: Id,
        claim_id: Option<Id>,
        expires_after: u64,
        limit: Option<usize>,
    ) -> Result<Vec<MessageView>> {
        let now = self.clock.now_secs();
        let docs = self
            .store
            .message_claimed(qid, claim_id, expires_after, limit)
            .await?;
        Ok(docs
            .into_iter()
            .map(|doc| MessageView::from_doc(doc, now))
            .collect())
    }

    /// Removes every message belonging to `qid`. Best-effort; a missing
    /// queue is not an error (there is simply nothing to remove).
    pub(crate) async fn purge_queue(&self, qid: Id) -> u64 {
        self.store.message_purge_queue(qid).await
    }

    /// Releases a claim by its stringified id: resets `c` to the null
    /// placeholder on every message carrying it. Idempotent and silent on a
    /// malformed or unknown id.
    pub async fn unclaim(&self, claim_id: &str) -> Result<u64> {
        match Id::from_str(claim_id) {
            Ok(claim_id) => self.unclaim_id(claim_id).await,
            Err(_) => Ok(0),
        }
    }

    pub(crate) async fn unclaim_id(&self, claim_id: Id) -> Result<u64> {
        Ok(self.store.message_unclaim(claim_id).await?)
    }
}

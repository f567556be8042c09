//! In-memory [`DocumentStore`] reference implementation.
//!
//! Two collections, each guarded by its own `parking_lot::RwLock` (mirroring
//! the teacher's lock-free-read `DashMap`-backed engine, but keyed by a
//! `BTreeMap` so ascending-id iteration — the thing every compound index in
//! §4.2 exists to support — falls out of the collection type instead of a
//! secondary sort). A background `tokio` task sweeps expired messages on an
//! interval, standing in for a document store's TTL index; every read path
//! additionally filters `e > now` itself, so correctness never depends on
//! the sweeper's timing.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use qcore::{ClockSource, Document, Id, IdGenerator};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{ClaimRecord, DocumentStore, MessageDoc, NewMessage, QueueDoc};

type QueueKey = (Option<String>, String);

/// In-memory, single-process [`DocumentStore`].
///
/// Not persistent and not clustered, but a legitimate backend in its own
/// right for a single-node deployment, and the store the controllers' own
/// test suite runs against.
pub struct InMemoryStore {
    id_gen: IdGenerator,
    clock: Arc<dyn ClockSource>,
    queues: RwLock<BTreeMap<QueueKey, QueueDoc>>,
    messages: RwLock<BTreeMap<Id, MessageDoc>>,
}

impl InMemoryStore {
    /// Creates an empty store backed by the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn ClockSource>) -> Arc<Self> {
        Arc::new(Self {
            id_gen: IdGenerator::new(clock.clone()),
            clock,
            queues: RwLock::new(BTreeMap::new()),
            messages: RwLock::new(BTreeMap::new()),
        })
    }

    /// Spawns the background TTL sweeper. Holds only a [`Weak`] reference,
    /// so it exits on its own once the store is dropped.
    pub fn spawn_ttl_sweeper(self: &Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(store) => store.sweep_expired(),
                    None => break,
                }
            }
        })
    }

    fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    fn sweep_expired(&self) {
        let now = self.now();
        let mut messages = self.messages.write();
        let before = messages.len();
        messages.retain(|_, doc| doc.expires_at > now);
        let removed = before - messages.len();
        if removed > 0 {
            tracing::debug!(removed, "ttl sweep reaped expired messages");
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn mint_id(&self) -> Id {
        self.id_gen.generate()
    }

    fn spawn_maintenance(self: &Arc<Self>, interval_secs: u64) -> Option<JoinHandle<()>> {
        Some(self.spawn_ttl_sweeper(interval_secs))
    }

    async fn queue_upsert(
        &self,
        project: Option<&str>,
        name: &str,
        metadata: Document,
    ) -> anyhow::Result<bool> {
        let key: QueueKey = (project.map(str::to_string), name.to_string());
        let mut queues = self.queues.write();
        if let Some(existing) = queues.get_mut(&key) {
            existing.metadata = metadata;
            Ok(false)
        } else {
            let qid = self.mint_id();
            queues.insert(
                key.clone(),
                QueueDoc {
                    qid,
                    project: key.0,
                    name: key.1,
                    metadata,
                },
            );
            Ok(true)
        }
    }

    async fn queue_get(
        &self,
        project: Option<&str>,
        name: &str,
    ) -> anyhow::Result<Option<QueueDoc>> {
        let key: QueueKey = (project.map(str::to_string), name.to_string());
        Ok(self.queues.read().get(&key).cloned())
    }

    async fn queue_delete(&self, project: Option<&str>, name: &str) -> anyhow::Result<()> {
        let key: QueueKey = (project.map(str::to_string), name.to_string());
        self.queues.write().remove(&key);
        Ok(())
    }

    async fn queue_list(
        &self,
        project: Option<&str>,
        marker: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<QueueDoc>> {
        let queues = self.queues.read();
        let project = project.map(str::to_string);
        let docs = queues
            .iter()
            .filter(|(key, _)| key.0 == project)
            .filter(|(key, _)| marker.is_none_or(|m| key.1.as_str() > m))
            .map(|(_, doc)| doc.clone())
            .take(limit)
            .collect();
        Ok(docs)
    }

    async fn message_insert(
        &self,
        qid: Id,
        new_messages: Vec<NewMessage>,
        client_uuid: Option<Uuid>,
        now: u64,
    ) -> anyhow::Result<Vec<Id>> {
        let mut messages = self.messages.write();
        let mut ids = Vec::with_capacity(new_messages.len());
        for new_message in new_messages {
            let id = self.mint_id();
            messages.insert(
                id,
                MessageDoc {
                    id,
                    qid,
                    ttl_secs: new_message.ttl_secs,
                    expires_at: now + new_message.ttl_secs,
                    client_uuid,
                    claim: ClaimRecord::none(now),
                    body: new_message.body,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn message_get(&self, qid: Id, id: Id, now: u64) -> anyhow::Result<Option<MessageDoc>> {
        Ok(self
            .messages
            .read()
            .get(&id)
            .filter(|doc| doc.qid == qid && doc.is_live(now))
            .cloned())
    }

    async fn message_active(
        &self,
        qid: Id,
        marker: Option<Id>,
        echo: bool,
        client_uuid: Option<Uuid>,
        limit: Option<usize>,
        now: u64,
    ) -> anyhow::Result<Vec<MessageDoc>> {
        let messages = self.messages.read();
        let lower = marker.map_or(Bound::Unbounded, Bound::Excluded);
        let iter = messages
            .range((lower, Bound::Unbounded))
            .map(|(_, doc)| doc)
            .filter(|doc| doc.qid == qid)
            .filter(|doc| doc.is_live(now))
            .filter(|doc| !doc.claim.is_live(now))
            .filter(|doc| echo || client_uuid.is_none() || doc.client_uuid != client_uuid)
            .cloned();
        Ok(match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    async fn message_claimed(
        &self,
        qid: Id,
        claim_id: Option<Id>,
        expires_after: u64,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<MessageDoc>> {
        let messages = self.messages.read();
        let iter = messages
            .values()
            .filter(|doc| doc.qid == qid)
            .filter(|doc| doc.claim.expires_at > expires_after)
            .filter(|doc| match claim_id {
                Some(cid) => doc.claim.id == Some(cid),
                None => doc.claim.id.is_some(),
            })
            .cloned();
        Ok(match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    async fn message_delete(&self, qid: Id, id: Id) {
        let mut messages = self.messages.write();
        if messages.get(&id).is_some_and(|doc| doc.qid == qid) {
            messages.remove(&id);
        }
    }

    async fn message_delete_if_claimed(
        &self,
        qid: Id,
        id: Id,
        claim: Id,
        now: u64,
    ) -> anyhow::Result<bool> {
        let mut messages = self.messages.write();
        let permitted = messages.get(&id).is_some_and(|doc| {
            doc.qid == qid && doc.is_live(now) && doc.claim.is_live(now) && doc.claim.id == Some(claim)
        });
        if permitted {
            messages.remove(&id);
        }
        Ok(permitted)
    }

    async fn message_purge_queue(&self, qid: Id) -> u64 {
        let mut messages = self.messages.write();
        let before = messages.len();
        messages.retain(|_, doc| doc.qid != qid);
        (before - messages.len()) as u64
    }

    async fn message_unclaim(&self, claim_id: Id) -> anyhow::Result<u64> {
        let mut messages = self.messages.write();
        let mut touched = 0u64;
        for doc in messages.values_mut() {
            if doc.claim.id == Some(claim_id) {
                // The original driver resets `e` to 0 rather than the
                // message's creation time -- an always-expired sentinel,
                // functionally equivalent for the `c.e <= now` check.
                doc.claim = ClaimRecord {
                    id: None,
                    expires_at: 0,
                    ttl_secs: None,
                };
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn message_claim_conditional(
        &self,
        ids: &[Id],
        claim: ClaimRecord,
        now: u64,
    ) -> anyhow::Result<u64> {
        let mut messages = self.messages.write();
        let mut updated = 0u64;
        for id in ids {
            if let Some(doc) = messages.get_mut(id) {
                let claimable = doc.claim.id.is_none() || doc.claim.expires_at <= now;
                if claimable {
                    doc.claim = claim;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn message_rewrite_claim(
        &self,
        qid: Id,
        claim_id: Id,
        claim: ClaimRecord,
    ) -> anyhow::Result<u64> {
        let mut messages = self.messages.write();
        let mut updated = 0u64;
        for doc in messages.values_mut() {
            if doc.qid == qid && doc.claim.id == Some(claim_id) {
                doc.claim = claim;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn message_extend_for_claim(
        &self,
        qid: Id,
        claim_id: Id,
        expires: u64,
        ttl_secs: u64,
    ) -> anyhow::Result<u64> {
        let mut messages = self.messages.write();
        let mut updated = 0u64;
        for doc in messages.values_mut() {
            if doc.qid == qid && doc.claim.id == Some(claim_id) && doc.expires_at < expires {
                doc.expires_at = expires;
                doc.ttl_secs = ttl_secs;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcore::ManualClock;

    fn store() -> Arc<InMemoryStore> {
        InMemoryStore::new(Arc::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn queue_upsert_is_idempotent_on_created_flag() {
        let store = store();
        let created = store
            .queue_upsert(Some("proj"), "q1", Document::Null)
            .await
            .unwrap();
        assert!(created);
        let created_again = store
            .queue_upsert(Some("proj"), "q1", Document::Null)
            .await
            .unwrap();
        assert!(!created_again);
    }

    #[tokio::test]
    async fn message_active_excludes_expired_and_claimed() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = InMemoryStore::new(clock.clone());
        let qid = store.mint_id();
        let ids = store
            .message_insert(
                qid,
                vec![
                    NewMessage {
                        ttl_secs: 10,
                        body: Document::Null,
                    },
                    NewMessage {
                        ttl_secs: 10,
                        body: Document::Null,
                    },
                ],
                None,
                1_000,
            )
            .await
            .unwrap();

        store
            .message_claim_conditional(
                &ids[..1],
                ClaimRecord {
                    id: Some(store.mint_id()),
                    expires_at: 1_050,
                    ttl_secs: Some(50),
                },
                1_000,
            )
            .await
            .unwrap();

        let active = store
            .message_active(qid, None, true, None, None, 1_000)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, ids[1]);
    }
}

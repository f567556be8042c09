//! Claim lifecycle: best-effort creation, lookup, renewal, and release.
//!
//! Creation is the one genuinely tricky operation in this crate: the store
//! offers no multi-document transaction, so a claim is built out of a
//! select, a conditional update, and a follow-up read, tolerating the race
//! where another claim wins a subset of the same candidates in between.

use std::str::FromStr;
use std::sync::Arc;

use qcore::{ClockSource, Id};
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::message::{MessageController, MessageView};
use crate::queue::QueueController;
use crate::store::{ClaimRecord, DocumentStore};

/// A live claim and the messages currently reserved under it.
#[derive(Debug, Clone)]
pub struct Claim {
    pub id: Id,
    /// Seconds elapsed since the claim was created.
    pub age_secs: u64,
    pub ttl_secs: u64,
    pub expires_at: u64,
    pub messages: Vec<MessageView>,
}

/// Operations over the embedded claim records of a single queue's messages.
pub struct ClaimController<S> {
    store: Arc<S>,
    queues: Arc<QueueController<S>>,
    messages: Arc<MessageController<S>>,
    config: Arc<CoreConfig>,
    clock: Arc<dyn ClockSource>,
}

impl<S: DocumentStore> ClaimController<S> {
    pub fn new(
        store: Arc<S>,
        queues: Arc<QueueController<S>>,
        messages: Arc<MessageController<S>>,
        config: Arc<CoreConfig>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            store,
            queues,
            messages,
            config,
            clock,
        }
    }

    /// Reserves up to `limit` unclaimed, unexpired messages.
    ///
    /// 1. Select candidate ids among messages with no live claim, ascending
    ///    by id, up to `limit`.
    /// 2. Mint a fresh claim id.
    /// 3. Conditionally stamp the candidates with the new claim, but only
    ///    those still unclaimed at update time -- a concurrent claim may
    ///    have already taken some of them. This can only shrink the set
    ///    below what was selected; it can never hand out a message twice.
    /// 4. Extend each won message's own TTL so it outlives the claim.
    /// 5. Re-read the actually-won set and return it.
    ///
    /// `ttl_secs`/`limit` fall back to [`CoreConfig::default_claim_ttl_secs`]
    /// / [`CoreConfig::default_claim_limit`] when not supplied. Returns a
    /// claim with an empty `messages` list if nothing was available or every
    /// candidate lost the race -- not an error.
    pub async fn create(
        &self,
        project: Option<&str>,
        name: &str,
        ttl_secs: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Claim> {
        let ttl_secs = ttl_secs.unwrap_or(self.config.default_claim_ttl_secs);
        let limit = limit.unwrap_or(self.config.default_claim_limit);
        if ttl_secs == 0 {
            return Err(Error::InvalidTtl("claim ttl must be greater than zero".into()));
        }
        let qid = self.queues.resolve_id(project, name).await?;
        let now = self.clock.now_secs();

        let candidates = self
            .messages
            .active(project, name, None, true, None, Some(limit))
            .await?;
        let candidate_ids: Vec<Id> = candidates.iter().map(|doc| doc.id).collect();

        let claim_id = self.store_mint_id();
        let expires_at = now + ttl_secs;
        let record = ClaimRecord {
            id: Some(claim_id),
            expires_at,
            ttl_secs: Some(ttl_secs),
        };

        let won = self.claim_conditional(&candidate_ids, record, now).await?;
        if won < candidate_ids.len() as u64 {
            warn!(
                project,
                name,
                selected = candidate_ids.len(),
                won,
                "claim creation lost part of its candidate set to a concurrent claim"
            );
        }

        self.extend_for_claim(qid, claim_id, expires_at, ttl_secs).await?;

        let messages = self.messages.claimed(qid, Some(claim_id), now, None).await?;
        debug!(project, name, claim = %claim_id, claimed = messages.len(), "claim created");

        Ok(Claim {
            id: claim_id,
            age_secs: now.saturating_sub(claim_id.created_at_secs()),
            ttl_secs,
            expires_at,
            messages,
        })
    }

    /// Looks up a live claim and the messages it currently covers.
    ///
    /// A malformed claim id is treated the same as an unknown one: both fail
    /// [`Error::ClaimDoesNotExist`].
    pub async fn get(&self, project: Option<&str>, name: &str, claim_id: &str) -> Result<Claim> {
        let Ok(claim_id) = Id::from_str(claim_id) else {
            return Err(Error::ClaimDoesNotExist {
                id: claim_id.to_string(),
                queue: name.to_string(),
            });
        };
        self.get_by_id(project, name, claim_id).await
    }

    async fn get_by_id(&self, project: Option<&str>, name: &str, claim_id: Id) -> Result<Claim> {
        let qid = self.queues.resolve_id(project, name).await?;
        let now = self.clock.now_secs();
        let messages = self.messages.claimed(qid, Some(claim_id), now, None).await?;
        let first = messages
            .first()
            .ok_or_else(|| Error::ClaimDoesNotExist {
                id: claim_id.to_string(),
                queue: name.to_string(),
            })?;
        Ok(Claim {
            id: claim_id,
            age_secs: now.saturating_sub(claim_id.created_at_secs()),
            ttl_secs: first.claim.ttl_secs.unwrap_or_default(),
            expires_at: first.claim.expires_at,
            messages,
        })
    }

    /// Renews a live claim, extending every covered message's own
    /// expiration to match. `ttl_secs` falls back to
    /// [`CoreConfig::default_claim_ttl_secs`] when not supplied.
    pub async fn renew(
        &self,
        project: Option<&str>,
        name: &str,
        claim_id: &str,
        ttl_secs: Option<u64>,
    ) -> Result<Claim> {
        let ttl_secs = ttl_secs.unwrap_or(self.config.default_claim_ttl_secs);
        if ttl_secs == 0 {
            return Err(Error::InvalidTtl("claim ttl must be greater than zero".into()));
        }
        let Ok(claim_id) = Id::from_str(claim_id) else {
            return Err(Error::ClaimDoesNotExist {
                id: claim_id.to_string(),
                queue: name.to_string(),
            });
        };
        // Validate the claim is live before touching it.
        self.get_by_id(project, name, claim_id).await?;

        let qid = self.queues.resolve_id(project, name).await?;
        let now = self.clock.now_secs();
        let expires_at = now + ttl_secs;
        let record = ClaimRecord {
            id: Some(claim_id),
            expires_at,
            ttl_secs: Some(ttl_secs),
        };
        self.rewrite_claim(qid, claim_id, record).await?;
        self.extend_for_claim(qid, claim_id, expires_at, ttl_secs).await?;

        self.get_by_id(project, name, claim_id).await
    }

    /// Releases a claim, returning its messages to the active pool.
    ///
    /// Idempotent; never fails for an unknown or malformed claim id -- there
    /// is simply nothing left to release.
    pub async fn delete(&self, project: Option<&str>, name: &str, claim_id: &str) -> Result<()> {
        let _ = (project, name);
        let Ok(claim_id) = Id::from_str(claim_id) else {
            return Ok(());
        };
        self.messages.unclaim_id(claim_id).await?;
        debug!(project, name, claim = %claim_id, "claim released");
        Ok(())
    }

    fn store_mint_id(&self) -> Id {
        self.store.mint_id()
    }

    async fn claim_conditional(&self, ids: &[Id], claim: ClaimRecord, now: u64) -> Result<u64> {
        Ok(self.store.message_claim_conditional(ids, claim, now).await?)
    }

    async fn extend_for_claim(&self, qid: Id, claim_id: Id, expires: u64, ttl_secs: u64) -> Result<u64> {
        Ok(self.store.message_extend_for_claim(qid, claim_id, expires, ttl_secs).await?)
    }

    async fn rewrite_claim(&self, qid: Id, claim_id: Id, claim: ClaimRecord) -> Result<u64> {
        Ok(self.store.message_rewrite_claim(qid, claim_id, claim).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::NewMessage;
    use qcore::{Document, ManualClock};

    fn setup() -> (
        Arc<ClaimController<InMemoryStore>>,
        Arc<QueueController<InMemoryStore>>,
        Arc<MessageController<InMemoryStore>>,
        Arc<InMemoryStore>,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = InMemoryStore::new(clock.clone());
        let queues = Arc::new(QueueController::new(
            store.clone(),
            Arc::new(CoreConfig::default()),
            clock.clone(),
        ));
        let messages = Arc::new(MessageController::new(store.clone(), queues.clone(), clock.clone()));
        let claims = Arc::new(ClaimController::new(
            store.clone(),
            queues.clone(),
            messages.clone(),
            Arc::new(CoreConfig::default()),
            clock.clone(),
        ));
        (claims, queues, messages, store, clock)
    }

    async fn post_messages(store: &InMemoryStore, queues: &QueueController<InMemoryStore>, count: usize) -> Id {
        queues.upsert(None, "q", Document::Null).await.unwrap();
        let qid = queues.resolve_id(None, "q").await.unwrap();
        let batch = (0..count)
            .map(|_| NewMessage {
                ttl_secs: 300,
                body: Document::Null,
            })
            .collect();
        store.message_insert(qid, batch, None, 1_000).await.unwrap();
        qid
    }

    #[tokio::test]
    async fn create_claims_never_overlap_concurrently() {
        let (claims, queues, _messages, store, _clock) = setup();
        post_messages(&store, &queues, 4).await;

        let a = claims.create(None, "q", Some(60), Some(3)).await.unwrap();
        let b = claims.create(None, "q", Some(60), Some(3)).await.unwrap();

        let a_ids: std::collections::HashSet<_> = a.messages.iter().map(|m| m.id).collect();
        let b_ids: std::collections::HashSet<_> = b.messages.iter().map(|m| m.id).collect();
        assert!(a_ids.is_disjoint(&b_ids));
        assert_eq!(a_ids.len() + b_ids.len(), 4);
    }

    #[tokio::test]
    async fn create_applies_config_defaults_when_unspecified() {
        let (claims, queues, _messages, store, _clock) = setup();
        post_messages(&store, &queues, 1).await;
        let claim = claims.create(None, "q", None, None).await.unwrap();
        assert_eq!(claim.ttl_secs, CoreConfig::default().default_claim_ttl_secs);
    }

    #[tokio::test]
    async fn renew_extends_message_expiration() {
        let (claims, queues, _messages, store, _clock) = setup();
        post_messages(&store, &queues, 1).await;
        let claim = claims.create(None, "q", Some(10), Some(10)).await.unwrap();
        let before = claim.messages[0].expires_at;

        let renewed = claims
            .renew(None, "q", &claim.id.to_string(), Some(500))
            .await
            .unwrap();
        assert!(renewed.messages[0].expires_at > before);
    }

    #[tokio::test]
    async fn delete_releases_messages_back_to_active() {
        let (claims, queues, _messages, store, _clock) = setup();
        let qid = post_messages(&store, &queues, 1).await;
        let claim = claims.create(None, "q", Some(60), Some(10)).await.unwrap();

        claims.delete(None, "q", &claim.id.to_string()).await.unwrap();

        let active = store
            .message_active(qid, None, true, None, None, 1_000)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent_for_unknown_and_malformed_ids() {
        let (claims, queues, _messages, store, _clock) = setup();
        post_messages(&store, &queues, 1).await;
        let bogus = store.mint_id();
        claims.delete(None, "q", &bogus.to_string()).await.unwrap();
        claims.delete(None, "q", "not-a-valid-id").await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_claim_errors() {
        let (claims, queues, _messages, store, _clock) = setup();
        post_messages(&store, &queues, 1).await;
        let bogus = store.mint_id();
        let err = claims.get(None, "q", &bogus.to_string()).await.unwrap_err();
        assert!(matches!(err, Error::ClaimDoesNotExist { .. }));
    }

    #[tokio::test]
    async fn get_with_malformed_id_errors() {
        let (claims, queues, _messages, store, _clock) = setup();
        post_messages(&store, &queues, 1).await;
        let err = claims.get(None, "q", "not-a-valid-id").await.unwrap_err();
        assert!(matches!(err, Error::ClaimDoesNotExist { .. }));
    }

    #[tokio::test]
    async fn get_reports_age() {
        let (claims, queues, _messages, store, clock) = setup();
        post_messages(&store, &queues, 1).await;
        let claim = claims.create(None, "q", Some(60), Some(10)).await.unwrap();
        clock.advance(5);
        let fetched = claims.get(None, "q", &claim.id.to_string()).await.unwrap();
        assert_eq!(fetched.age_secs, 5);
    }
}

#[cfg(test)]
mod race_properties {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::NewMessage;
    use proptest::prelude::*;
    use qcore::{Document, ManualClock};
    use std::collections::HashSet;

    proptest! {
        // Any number of claimants racing for the same queue must end up with
        // disjoint message sets and never hand out more messages than exist.
        #[test]
        fn concurrent_claims_never_overlap(
            message_count in 1usize..20,
            claimant_count in 1usize..8,
            per_claim_limit in 1usize..10,
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let clock = Arc::new(ManualClock::new(1_000));
                let store = InMemoryStore::new(clock.clone());
                let queues = Arc::new(QueueController::new(
                    store.clone(),
                    Arc::new(CoreConfig::default()),
                    clock.clone(),
                ));
                let messages = Arc::new(MessageController::new(store.clone(), queues.clone(), clock.clone()));
                let claims = Arc::new(ClaimController::new(
                    store.clone(),
                    queues.clone(),
                    messages,
                    Arc::new(CoreConfig::default()),
                    clock,
                ));

                queues.upsert(None, "q", Document::Null).await.unwrap();
                let qid = queues.resolve_id(None, "q").await.unwrap();
                let batch = (0..message_count)
                    .map(|_| NewMessage {
                        ttl_secs: 300,
                        body: Document::Null,
                    })
                    .collect();
                store.message_insert(qid, batch, None, 1_000).await.unwrap();

                let handles: Vec<_> = (0..claimant_count)
                    .map(|_| {
                        let claims = claims.clone();
                        tokio::spawn(async move {
                            claims.create(None, "q", Some(60), Some(per_claim_limit)).await.unwrap()
                        })
                    })
                    .collect();

                let mut seen = HashSet::new();
                let mut total = 0usize;
                for handle in handles {
                    let claim = handle.await.unwrap();
                    for message in &claim.messages {
                        assert!(seen.insert(message.id), "message {} claimed twice", message.id);
                    }
                    total += claim.messages.len();
                }
                assert!(total <= message_count);
            });
        }
    }
}

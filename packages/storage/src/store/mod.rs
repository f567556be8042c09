//! The document store contract: the storage core's only dependency.
//!
//! [`DocumentStore`] stands in for a real document database offering atomic
//! single-document updates, compound indexing, conditional multi-document
//! updates with a match-count return, and automatic TTL-based expiration.
//! [`memory`] ships one concrete, in-process implementation.

pub mod memory;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use qcore::{Document, Id};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A lazy, owned sequence of results. Every controller method that scans a
/// collection returns one of these rather than a materialized `Vec`, so a
/// networked backend can stream server-side cursor pages without this crate
/// needing to change its call sites.
pub type DocStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Wraps an already-fetched batch of results into a [`DocStream`].
///
/// The in-memory store has no server-side cursor to hold open, so it always
/// goes through this helper; a real cursor-backed store would instead wrap
/// its native streaming cursor type directly.
#[must_use]
pub fn stream_of<T: Send + 'static>(items: Vec<T>) -> DocStream<T> {
    Box::pin(futures_util::stream::iter(items))
}

/// A `queues` collection document: `{_id, p: project, n: name, m: metadata}`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDoc {
    /// The stable internal queue id (`_id`).
    pub qid: Id,
    /// `p`: opaque project identifier, or `None` for the default tenant.
    pub project: Option<String>,
    /// `n`: queue name, unique within `project`.
    pub name: String,
    /// `m`: opaque user-supplied metadata document.
    pub metadata: Document,
}

/// The embedded claim record carried by every message document (`c`).
///
/// A claim is "live" iff `id` is `Some` and `expires_at > now`. Fresh
/// messages carry the null placeholder `{id: None, expires_at: created_at}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRecord {
    /// `c.id`: the covering claim's id, or `None` if unclaimed.
    pub id: Option<Id>,
    /// `c.e`: absolute claim expiration, seconds since epoch.
    pub expires_at: u64,
    /// `c.t`: claim TTL in seconds. Only meaningful while `id` is `Some`.
    pub ttl_secs: Option<u64>,
}

impl ClaimRecord {
    /// The placeholder every fresh message starts with: no claim, `e` set to
    /// the message's own creation time (so `c.e <= now` holds immediately).
    #[must_use]
    pub fn none(now: u64) -> Self {
        Self {
            id: None,
            expires_at: now,
            ttl_secs: None,
        }
    }

    /// Whether this claim record is live at `now`.
    #[must_use]
    pub fn is_live(&self, now: u64) -> bool {
        self.id.is_some() && self.expires_at > now
    }
}

/// A `messages` collection document.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDoc {
    /// The stable message id (`_id`), monotone with creation time.
    pub id: Id,
    /// `q`: the owning queue's id.
    pub qid: Id,
    /// `t`: TTL in seconds, as supplied (or extended) by the caller.
    pub ttl_secs: u64,
    /// `e`: absolute expiration, seconds since epoch.
    pub expires_at: u64,
    /// `u`: the producing client's id, for echo suppression.
    pub client_uuid: Option<Uuid>,
    /// `c`: the embedded claim record.
    pub claim: ClaimRecord,
    /// `b`: the opaque message body.
    pub body: Document,
}

impl MessageDoc {
    /// Whether this message is live (unexpired) at `now`.
    #[must_use]
    pub fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

/// A caller-supplied message awaiting an id and timestamps from `post`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Requested TTL in seconds.
    pub ttl_secs: u64,
    /// Message body; defaults to an empty document if omitted by the caller.
    pub body: Document,
}

/// The document store contract.
///
/// Every method takes the resolved collection key (e.g. `qid`) rather than
/// `(project, queue_name)` — resolving a queue name to its id is the queue
/// controller's job, not the store's.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Mints a fresh, creation-time-ordered [`Id`]. The store owns id
    /// generation, the same way a document database's driver assigns `_id`
    /// on insert.
    fn mint_id(&self) -> Id;

    /// Starts whatever background maintenance this backend needs (e.g. a TTL
    /// sweep), returning a handle the caller should hold for as long as the
    /// maintenance should keep running. A backend with native expiry (a real
    /// document store's TTL index) has nothing to run and returns `None`.
    fn spawn_maintenance(self: &Arc<Self>, interval_secs: u64) -> Option<JoinHandle<()>>
    where
        Self: Sized,
    {
        let _ = interval_secs;
        None
    }

    // --- queues ---

    /// Idempotent upsert of `(project, name) -> metadata`. Returns `true`
    /// iff a new queue document was created.
    async fn queue_upsert(
        &self,
        project: Option<&str>,
        name: &str,
        metadata: Document,
    ) -> anyhow::Result<bool>;

    /// Looks up a queue document by `(project, name)`.
    async fn queue_get(&self, project: Option<&str>, name: &str) -> anyhow::Result<Option<QueueDoc>>;

    /// Removes the queue document, if present. Not an error when absent.
    async fn queue_delete(&self, project: Option<&str>, name: &str) -> anyhow::Result<()>;

    /// Lists queues in `project` ordered ascending by name, restricted to
    /// names strictly greater than `marker`, cut off at `limit`.
    async fn queue_list(
        &self,
        project: Option<&str>,
        marker: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<QueueDoc>>;

    // --- messages ---

    /// Inserts one document per `NewMessage`, assigning each a fresh id and
    /// the given expiration/claim-placeholder fields, preserving input
    /// order in the returned ids.
    async fn message_insert(
        &self,
        qid: Id,
        messages: Vec<NewMessage>,
        client_uuid: Option<Uuid>,
        now: u64,
    ) -> anyhow::Result<Vec<Id>>;

    /// Fetches a single live message by `(qid, id)`.
    async fn message_get(&self, qid: Id, id: Id, now: u64) -> anyhow::Result<Option<MessageDoc>>;

    /// `q = qid ∧ e > now ∧ c.e ≤ now`, optionally excluding `client_uuid`
    /// (echo suppression) and restricted to ids greater than `marker`.
    /// Ascending id order, cut off at `limit` (unbounded if `None`).
    async fn message_active(
        &self,
        qid: Id,
        marker: Option<Id>,
        echo: bool,
        client_uuid: Option<Uuid>,
        limit: Option<usize>,
        now: u64,
    ) -> anyhow::Result<Vec<MessageDoc>>;

    /// `q = qid ∧ c.e > expires_after`, optionally restricted to
    /// `c.id = claim_id` (else `c.id ≠ null`). Ascending id order, cut off
    /// at `limit`.
    async fn message_claimed(
        &self,
        qid: Id,
        claim_id: Option<Id>,
        expires_after: u64,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<MessageDoc>>;

    /// Unconditional delete by `(qid, id)`. Best-effort (no acknowledgement
    /// wait). Not an error when absent.
    async fn message_delete(&self, qid: Id, id: Id);

    /// Deletes `(qid, id)` only if it is live and carries a live claim equal
    /// to `claim`. Returns `true` if deleted, `false` if the gate failed
    /// (message absent, expired, unclaimed, or claimed by someone else).
    async fn message_delete_if_claimed(
        &self,
        qid: Id,
        id: Id,
        claim: Id,
        now: u64,
    ) -> anyhow::Result<bool>;

    /// Removes every message with `q = qid`. Best-effort. Returns the number
    /// removed.
    async fn message_purge_queue(&self, qid: Id) -> u64;

    /// Sets `c` back to the null placeholder on every message with
    /// `c.id = claim_id`. Returns the number of messages touched.
    async fn message_unclaim(&self, claim_id: Id) -> anyhow::Result<u64>;

    /// Claim-creation step 4: sets `c = claim` on every message in `ids`
    /// whose current claim is null or expired. Returns the number actually
    /// modified — the race-loss signal claim creation relies on.
    async fn message_claim_conditional(
        &self,
        ids: &[Id],
        claim: ClaimRecord,
        now: u64,
    ) -> anyhow::Result<u64>;

    /// Rewrites `c` unconditionally on every message with
    /// `(q, c.id) = (qid, claim_id)` — used by claim renewal, which has
    /// already verified the claim is live.
    async fn message_rewrite_claim(
        &self,
        qid: Id,
        claim_id: Id,
        claim: ClaimRecord,
    ) -> anyhow::Result<u64>;

    /// Claim-creation/renewal step 5: on every message with
    /// `(q, c.id) = (qid, claim_id) ∧ e < expires`, sets `e = expires` and
    /// `t = ttl_secs`, so a claimed message always outlives its claim.
    async fn message_extend_for_claim(
        &self,
        qid: Id,
        claim_id: Id,
        expires: u64,
        ttl_secs: u64,
    ) -> anyhow::Result<u64>;
}

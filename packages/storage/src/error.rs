//! Error taxonomy surfaced at the boundary of the storage core.

/// Errors returned by the queue, message, and claim controllers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No queue with this `(project, name)` pair exists.
    #[error("queue {name:?} does not exist in project {project:?}")]
    QueueDoesNotExist {
        /// The queue name that was looked up.
        name: String,
        /// The project it was looked up in.
        project: Option<String>,
    },

    /// No live, unexpired message with this id exists in this queue.
    #[error("message {id:?} does not exist in queue {queue:?}")]
    MessageDoesNotExist {
        /// The message id that was looked up.
        id: String,
        /// The queue it was looked up in.
        queue: String,
    },

    /// No live claim with this id exists in this queue.
    #[error("claim {id:?} does not exist in queue {queue:?}")]
    ClaimDoesNotExist {
        /// The claim id that was looked up.
        id: String,
        /// The queue it was looked up in.
        queue: String,
    },

    /// The caller's claim id does not cover the target message.
    #[error("claim {claim:?} does not permit operating on message {message:?}")]
    ClaimNotPermitted {
        /// The message the caller tried to act on.
        message: String,
        /// The claim id the caller presented.
        claim: String,
    },

    /// A supplied TTL (or the expiration it implies) is malformed: not a
    /// non-negative integer, or one that fails to produce a future
    /// expiration.
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),

    /// The underlying document store failed. Propagated unchanged; the
    /// core never retries internally.
    #[error("storage backend error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Convenience alias for controller return types.
pub type Result<T> = std::result::Result<T, Error>;

//! Storage core for a multi-tenant message-queue service.
//!
//! Wires the [`store::DocumentStore`] contract to three controllers --
//! [`queue::QueueController`], [`message::MessageController`], and
//! [`claim::ClaimController`] -- that implement queue CRUD, message
//! posting/listing, and claim-based consumption with echo suppression.

pub mod claim;
pub mod config;
pub mod error;
pub mod message;
pub mod queue;
pub mod store;

use std::sync::Arc;

use qcore::ClockSource;
use tokio::task::JoinHandle;

pub use claim::{Claim, ClaimController};
pub use config::CoreConfig;
pub use error::{Error, Result};
pub use message::{MessageController, MessageView};
pub use queue::{QueueController, QueueMessageStats, QueueStats};
pub use store::memory::InMemoryStore;
pub use store::{ClaimRecord, DocumentStore, MessageDoc, NewMessage, QueueDoc};

/// Facade bundling the three controllers over a shared store and clock.
///
/// Equivalent to constructing each controller by hand; exists so callers
/// embedding this crate have one thing to hold onto. Also owns the store's
/// background maintenance task (the TTL sweeper, for the in-memory
/// reference store), aborting it on drop.
pub struct Core<S> {
    pub queues: Arc<QueueController<S>>,
    pub messages: Arc<MessageController<S>>,
    pub claims: Arc<ClaimController<S>>,
    maintenance: Option<JoinHandle<()>>,
}

impl<S: DocumentStore + 'static> Core<S> {
    pub fn new(store: Arc<S>, config: CoreConfig, clock: Arc<dyn ClockSource>) -> Self {
        let config = Arc::new(config);
        let maintenance = store.spawn_maintenance(config.ttl_sweep_interval_secs);
        let queues = Arc::new(QueueController::new(store.clone(), config.clone(), clock.clone()));
        let messages = Arc::new(MessageController::new(store.clone(), queues.clone(), clock.clone()));
        let claims = Arc::new(ClaimController::new(
            store,
            queues.clone(),
            messages.clone(),
            config,
            clock,
        ));
        Self {
            queues,
            messages,
            claims,
            maintenance,
        }
    }
}

impl<S> Drop for Core<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.maintenance.take() {
            handle.abort();
        }
    }
}

//! Queue-core foundation layer -- clock injection, id generation, and the
//! opaque document type shared by the storage crate.
//!
//! - **Clock** ([`clock`]): [`ClockSource`] abstraction for deterministic testing
//! - **Id** ([`id`]): creation-time-ordered, `ObjectId`-shaped identifiers
//! - **Types** ([`types`]): [`Document`], the opaque JSON value used for bodies and metadata

pub mod clock;
pub mod id;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use id::{Id, IdGenerator, MalformedId};
pub use types::{empty_document, Document};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}

//! Offline synchronization engine
//!
//! Keeps the local document store eventually consistent with the
//! remote REST authority: pull remote records in, push the outbox out,
//! last writer wins per document.

mod engine;

pub use engine::{PassSummary, SyncEngine, SyncEvent, SyncHandle, SyncOutcome};

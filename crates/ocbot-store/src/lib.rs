//! Position ledger boundary.
//!
//! [`PositionStore`] is the persistence surface the engine consumes. Writes
//! to a position are conditioned on the `row_version` the caller read; a
//! lost race comes back as [`UpdateOutcome::Conflict`], not as an error.
//! [`MemoryStore`] is the in-process implementation used by paper mode and
//! tests.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{PositionStore, SharedStore, UpdateOutcome};

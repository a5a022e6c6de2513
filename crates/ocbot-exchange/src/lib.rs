//! Exchange collaborator boundary.
//!
//! - [`ExchangeClient`]: the capability surface the engine consumes
//! - [`ExchangeError`]: error taxonomy with non-retryable classification
//! - [`adapter`]: per-exchange payloads to canonical positions and orders
//! - [`PaperExchange`]: in-memory exchange for tests and paper trading
//!
//! Normalization happens here, once. Nothing above this crate reads
//! exchange-specific field names.

pub mod adapter;
pub mod client;
pub mod error;
pub mod paper;

pub use client::{ExchangeClient, Operation, OrderRequest, PlacedOrder, SharedExchange};
pub use error::{ExchangeError, ExchangeErrorKind, ExchangeResult};
pub use paper::{PaperCall, PaperExchange};

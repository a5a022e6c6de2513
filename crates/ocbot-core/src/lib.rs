//! Core domain types for the ocbot position engine.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Position`, `EntryOrder`, `Strategy`, `Bot`: ledger entities
//! - `ExchangePosition`, `ExchangeOrder`: canonical exchange-side shapes
//! - `normalize_symbol`: one canonical symbol form across exchange notations
//! - `Clock`: injectable time source
//! - `BoundedCache`: fixed-capacity recency cache
//! - `Retryable`: error classification consumed by the task queues

pub mod cache;
pub mod clock;
pub mod entry;
pub mod error;
pub mod exchange;
pub mod flag;
pub mod position;
pub mod retry;
pub mod strategy;
pub mod symbol;
pub mod types;

use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use cache::BoundedCache;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use entry::{
    ConcurrencyReservation, EntryOrder, EntryOrderStatus, ReservationStatus, ReservationToken,
};
pub use error::{CoreError, Result};
pub use exchange::{ExchangeOrder, ExchangeOrderType, ExchangePosition};
pub use flag::{deserialize_truthy, parse_truthy};
pub use position::{NewPosition, Position};
pub use retry::Retryable;
pub use strategy::{Bot, Strategy, TradeType};
pub use symbol::normalize_symbol;
pub use types::{
    BotId, CloseReason, ExchangeKind, OrderSide, PositionId, PositionSide, PositionStatus,
    StrategyId,
};

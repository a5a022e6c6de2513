//! Store trait.

use std::sync::Arc;

use ocbot_core::{
    Bot, BotId, BoxFuture, EntryOrder, EntryOrderStatus, NewPosition, Position, PositionId,
    PositionSide, ReservationStatus, ReservationToken, Strategy, StrategyId,
};

use crate::error::StoreResult;

/// Result of a version-conditioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Row written; it now carries `new_version`.
    Applied { new_version: u64 },
    /// Another writer got there first. Re-read before trying again.
    Conflict { current_version: u64 },
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Persistence surface for positions, entry orders, strategies and bots.
pub trait PositionStore: Send + Sync {
    /// Rows with status in `PositionStatus::ACTIVE` for one bot.
    fn active_positions(&self, bot_id: BotId) -> BoxFuture<'_, StoreResult<Vec<Position>>>;

    /// Active row for `(bot, normalized symbol, side)`, if any.
    fn find_active<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, StoreResult<Option<Position>>>;

    fn get_position(&self, id: PositionId) -> BoxFuture<'_, StoreResult<Option<Position>>>;

    /// Insert a row. Fails with `StoreError::Duplicate` when an active row
    /// already holds the same `exchange_position_key`.
    fn insert_position(&self, new: NewPosition) -> BoxFuture<'_, StoreResult<Position>>;

    /// Write `position` if the stored row still carries `position.row_version`.
    fn update_position(&self, position: Position) -> BoxFuture<'_, StoreResult<UpdateOutcome>>;

    /// Oldest open entry order for `(bot, normalized symbol, side)`.
    fn find_open_entry_order<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, StoreResult<Option<EntryOrder>>>;

    fn set_entry_order_status(
        &self,
        entry_id: u64,
        status: EntryOrderStatus,
    ) -> BoxFuture<'_, StoreResult<()>>;

    /// Finalize a reservation. Returns false when it was already finalized.
    fn finalize_reservation<'a>(
        &'a self,
        token: &'a ReservationToken,
        status: ReservationStatus,
    ) -> BoxFuture<'a, StoreResult<bool>>;

    /// First active strategy of a bot trading `normalized_symbol`.
    fn find_active_strategy<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Strategy>>>;

    fn get_strategy(&self, id: StrategyId) -> BoxFuture<'_, StoreResult<Option<Strategy>>>;

    fn get_bot(&self, id: BotId) -> BoxFuture<'_, StoreResult<Option<Bot>>>;

    fn active_bots(&self) -> BoxFuture<'_, StoreResult<Vec<Bot>>>;
}

pub type SharedStore = Arc<dyn PositionStore>;

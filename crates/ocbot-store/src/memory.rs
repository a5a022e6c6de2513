//! In-memory store.
//!
//! A partial unique index over `exchange_position_key` for active rows
//! rejects a second active position on the same `(bot, symbol, side)`,
//! mirroring the constraint a relational store carries.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ocbot_core::{
    normalize_symbol, Bot, BotId, BoxFuture, ConcurrencyReservation, EntryOrder,
    EntryOrderStatus, NewPosition, Position, PositionId, PositionSide, ReservationStatus,
    ReservationToken, SharedClock, Strategy, StrategyId,
};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::store::{PositionStore, UpdateOutcome};

#[derive(Debug, Default)]
struct Tables {
    positions: BTreeMap<PositionId, Position>,
    /// exchange_position_key -> id, active rows only.
    active_keys: HashMap<String, PositionId>,
    next_position_id: u64,
    entry_orders: BTreeMap<u64, EntryOrder>,
    next_entry_id: u64,
    strategies: BTreeMap<StrategyId, Strategy>,
    bots: BTreeMap<BotId, Bot>,
    reservations: HashMap<ReservationToken, ConcurrencyReservation>,
}

/// Process-local [`PositionStore`].
pub struct MemoryStore {
    clock: SharedClock,
    tables: RwLock<Tables>,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            tables: RwLock::new(Tables::default()),
            writes: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    pub fn insert_bot(&self, bot: Bot) {
        self.tables.write().bots.insert(bot.id, bot);
    }

    pub fn insert_strategy(&self, strategy: Strategy) {
        self.tables.write().strategies.insert(strategy.id, strategy);
    }

    /// Record an open entry order; `id` and `normalized_symbol` are assigned here.
    pub fn insert_entry_order(&self, mut entry: EntryOrder) -> EntryOrder {
        let mut tables = self.tables.write();
        tables.next_entry_id += 1;
        entry.id = tables.next_entry_id;
        entry.normalized_symbol = normalize_symbol(&entry.symbol);
        tables.entry_orders.insert(entry.id, entry.clone());
        entry
    }

    /// Consume a concurrency slot for `bot_id`.
    ///
    /// Every active position holds a slot. Active reservations not yet
    /// attached to an active position hold one too.
    pub fn reserve_slot(&self, bot_id: BotId, max: usize) -> StoreResult<ReservationToken> {
        let mut tables = self.tables.write();
        let held: Vec<&ReservationToken> = tables
            .positions
            .values()
            .filter(|p| p.bot_id == bot_id && p.is_active())
            .filter_map(|p| p.reservation_token.as_ref())
            .collect();
        let positions = tables
            .positions
            .values()
            .filter(|p| p.bot_id == bot_id && p.is_active())
            .count();
        let pending = tables
            .reservations
            .values()
            .filter(|r| r.bot_id == bot_id && r.status == ReservationStatus::Active)
            .filter(|r| !held.contains(&&r.token))
            .count();
        if positions + pending >= max {
            return Err(StoreError::LimitReached {
                bot_id: bot_id.get(),
                max,
            });
        }
        let token = ReservationToken::new(bot_id);
        tables.reservations.insert(
            token.clone(),
            ConcurrencyReservation {
                token: token.clone(),
                bot_id,
                status: ReservationStatus::Active,
                created_at_ms: self.clock.now_ms(),
                finalized_at_ms: None,
            },
        );
        debug!(bot_id = %bot_id, token = %token, "Concurrency slot reserved");
        Ok(token)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Successful mutations since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every position row, closed ones included, in id order.
    pub fn all_positions(&self) -> Vec<Position> {
        self.tables.read().positions.values().cloned().collect()
    }

    pub fn entry_order(&self, id: u64) -> Option<EntryOrder> {
        self.tables.read().entry_orders.get(&id).cloned()
    }

    pub fn reservation(&self, token: &ReservationToken) -> Option<ConcurrencyReservation> {
        self.tables.read().reservations.get(token).cloned()
    }

    /// Make every call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    // ========================================================================
    // Synchronous bodies
    // ========================================================================

    fn insert_sync(&self, new: NewPosition) -> StoreResult<Position> {
        let mut tables = self.tables.write();
        let key = new.exchange_position_key();
        if new.status.is_active() && tables.active_keys.contains_key(&key) {
            return Err(StoreError::Duplicate(key));
        }
        tables.next_position_id += 1;
        let id = PositionId::new(tables.next_position_id);
        let position = Position::from_new(id, new);
        if position.is_active() {
            tables.active_keys.insert(key, id);
        }
        tables.positions.insert(id, position.clone());
        self.wrote();
        trace!(position_id = %id, key = %position.exchange_position_key(), "Position inserted");
        Ok(position)
    }

    fn update_sync(&self, mut position: Position) -> StoreResult<UpdateOutcome> {
        let mut tables = self.tables.write();
        let stored = tables
            .positions
            .get(&position.id)
            .ok_or_else(|| StoreError::NotFound(format!("position {}", position.id)))?;
        if stored.row_version != position.row_version {
            return Ok(UpdateOutcome::Conflict {
                current_version: stored.row_version,
            });
        }

        let old_key = stored.is_active().then(|| stored.exchange_position_key());
        position.normalized_symbol = normalize_symbol(&position.symbol);
        let new_key = position.is_active().then(|| position.exchange_position_key());
        if let Some(key) = &new_key {
            if old_key.as_ref() != Some(key) && tables.active_keys.contains_key(key) {
                return Err(StoreError::Duplicate(key.clone()));
            }
        }
        if let Some(key) = old_key {
            tables.active_keys.remove(&key);
        }
        if let Some(key) = new_key {
            tables.active_keys.insert(key, position.id);
        }

        position.row_version += 1;
        let new_version = position.row_version;
        tables.positions.insert(position.id, position);
        self.wrote();
        Ok(UpdateOutcome::Applied { new_version })
    }

    fn finalize_sync(&self, token: &ReservationToken, status: ReservationStatus) -> StoreResult<bool> {
        let now = self.clock.now_ms();
        let mut tables = self.tables.write();
        let reservation = tables
            .reservations
            .get_mut(token)
            .ok_or_else(|| StoreError::NotFound(format!("reservation {token}")))?;
        if reservation.status != ReservationStatus::Active {
            return Ok(false);
        }
        reservation.status = status;
        reservation.finalized_at_ms = Some(now);
        self.wrote();
        Ok(true)
    }
}

impl PositionStore for MemoryStore {
    fn active_positions(&self, bot_id: BotId) -> BoxFuture<'_, StoreResult<Vec<Position>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .positions
                .values()
                .filter(|p| p.bot_id == bot_id && p.is_active())
                .cloned()
                .collect())
        })
    }

    fn find_active<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, StoreResult<Option<Position>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .positions
                .values()
                .find(|p| {
                    p.bot_id == bot_id
                        && p.is_active()
                        && p.normalized_symbol == normalized_symbol
                        && p.side == side
                })
                .cloned())
        })
    }

    fn get_position(&self, id: PositionId) -> BoxFuture<'_, StoreResult<Option<Position>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.tables.read().positions.get(&id).cloned())
        })
    }

    fn insert_position(&self, new: NewPosition) -> BoxFuture<'_, StoreResult<Position>> {
        Box::pin(async move {
            self.check_available()?;
            self.insert_sync(new)
        })
    }

    fn update_position(&self, position: Position) -> BoxFuture<'_, StoreResult<UpdateOutcome>> {
        Box::pin(async move {
            self.check_available()?;
            self.update_sync(position)
        })
    }

    fn find_open_entry_order<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, StoreResult<Option<EntryOrder>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .entry_orders
                .values()
                .find(|e| {
                    e.bot_id == bot_id
                        && e.status == EntryOrderStatus::Open
                        && e.normalized_symbol == normalized_symbol
                        && e.side == side
                })
                .cloned())
        })
    }

    fn set_entry_order_status(
        &self,
        entry_id: u64,
        status: EntryOrderStatus,
    ) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.check_available()?;
            let mut tables = self.tables.write();
            let entry = tables
                .entry_orders
                .get_mut(&entry_id)
                .ok_or_else(|| StoreError::NotFound(format!("entry order {entry_id}")))?;
            if entry.status != status {
                entry.status = status;
                self.wrote();
            }
            Ok(())
        })
    }

    fn finalize_reservation<'a>(
        &'a self,
        token: &'a ReservationToken,
        status: ReservationStatus,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            self.check_available()?;
            self.finalize_sync(token, status)
        })
    }

    fn find_active_strategy<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Strategy>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .strategies
                .values()
                .find(|s| {
                    s.bot_id == bot_id && s.is_active && s.normalized_symbol() == normalized_symbol
                })
                .cloned())
        })
    }

    fn get_strategy(&self, id: StrategyId) -> BoxFuture<'_, StoreResult<Option<Strategy>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.tables.read().strategies.get(&id).cloned())
        })
    }

    fn get_bot(&self, id: BotId) -> BoxFuture<'_, StoreResult<Option<Bot>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.tables.read().bots.get(&id).cloned())
        })
    }

    fn active_bots(&self) -> BoxFuture<'_, StoreResult<Vec<Bot>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .bots
                .values()
                .filter(|b| b.is_active)
                .cloned()
                .collect())
        })
    }
}

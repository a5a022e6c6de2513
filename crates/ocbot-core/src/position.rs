//! Position: the central ledger entity.
//!
//! A position row is never deleted. Closing sets `status = closed` with a
//! close reason and PnL. Every persisted mutation bumps `row_version`, and
//! writers condition their update on the version they read.

use crate::entry::ReservationToken;
use crate::symbol::normalize_symbol;
use crate::types::{
    BotId, CloseReason, ExchangeKind, PositionId, PositionSide, PositionStatus, StrategyId,
};

/// Fields required to insert a new position row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub bot_id: BotId,
    pub strategy_id: Option<StrategyId>,
    pub exchange: ExchangeKind,
    /// Exchange-native symbol.
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    /// Notional in quote currency.
    pub amount: f64,
    /// Contract quantity.
    pub quantity: f64,
    pub status: PositionStatus,
    pub entry_order_id: Option<String>,
    pub tp_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub current_reduce: Option<f64>,
    pub reservation_token: Option<ReservationToken>,
    pub opened_at_ms: u64,
}

impl NewPosition {
    pub fn normalized_symbol(&self) -> String {
        normalize_symbol(&self.symbol)
    }

    /// Natural key this row will carry once inserted.
    pub fn exchange_position_key(&self) -> String {
        position_key(self.exchange, self.bot_id, &self.normalized_symbol(), self.side)
    }
}

/// A tracked open or pending leveraged exposure on one symbol and side.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub bot_id: BotId,
    pub strategy_id: Option<StrategyId>,
    pub exchange: ExchangeKind,
    /// Exchange-native symbol.
    pub symbol: String,
    pub normalized_symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub amount: f64,
    pub quantity: f64,
    pub status: PositionStatus,

    pub entry_order_id: Option<String>,
    /// Unified reference to the most recent TP-or-SL order.
    pub exit_order_id: Option<String>,
    pub tp_order_id: Option<String>,
    pub sl_order_id: Option<String>,

    pub tp_price: Option<f64>,
    /// TP at open; anchors the trailing range.
    pub initial_tp_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    /// Trailing decay percent per minute in effect.
    pub current_reduce: Option<f64>,
    /// Trailing-TP clock (minutes already applied).
    pub minutes_elapsed: u32,
    pub last_trailing_ms: Option<u64>,

    /// Consecutive reconcile cycles in which the exchange did not report this position.
    pub not_on_exchange_count: u32,
    /// Cooperative soft lock.
    pub is_processing: bool,
    pub processing_since_ms: Option<u64>,
    /// Optimistic concurrency counter.
    pub row_version: u64,

    pub reservation_token: Option<ReservationToken>,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub close_reason: Option<CloseReason>,
    pub opened_at_ms: u64,
    pub closed_at_ms: Option<u64>,
}

impl Position {
    /// Materialize a stored row from an insert request.
    pub fn from_new(id: PositionId, new: NewPosition) -> Self {
        let normalized_symbol = new.normalized_symbol();
        Self {
            id,
            bot_id: new.bot_id,
            strategy_id: new.strategy_id,
            exchange: new.exchange,
            symbol: new.symbol,
            normalized_symbol,
            side: new.side,
            entry_price: new.entry_price,
            amount: new.amount,
            quantity: new.quantity,
            status: new.status,
            entry_order_id: new.entry_order_id,
            exit_order_id: None,
            tp_order_id: None,
            sl_order_id: None,
            tp_price: new.tp_price,
            initial_tp_price: new.tp_price,
            stop_loss_price: new.stop_loss_price,
            current_reduce: new.current_reduce,
            minutes_elapsed: 0,
            last_trailing_ms: None,
            not_on_exchange_count: 0,
            is_processing: false,
            processing_since_ms: None,
            row_version: 1,
            reservation_token: new.reservation_token,
            pnl: None,
            pnl_percent: None,
            close_reason: None,
            opened_at_ms: new.opened_at_ms,
            closed_at_ms: None,
        }
    }

    /// `{exchange}_{botId}_{symbol}_{side}`, unique among non-closed rows.
    pub fn exchange_position_key(&self) -> String {
        position_key(self.exchange, self.bot_id, &self.normalized_symbol, self.side)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Age in milliseconds; used as scheduling priority (older first).
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.opened_at_ms)
    }

    pub fn has_take_profit_order(&self) -> bool {
        self.tp_order_id.is_some()
    }

    pub fn has_stop_loss_order(&self) -> bool {
        self.sl_order_id.is_some()
    }

    /// Check if an exchange order id is referenced by this row.
    pub fn references_order(&self, order_id: &str) -> bool {
        [&self.exit_order_id, &self.tp_order_id, &self.sl_order_id]
            .iter()
            .any(|id| id.as_deref() == Some(order_id))
    }

    /// Check if the soft lock is held and still fresh.
    ///
    /// A lock older than `stale_after_ms` is treated as abandoned.
    pub fn is_locked(&self, now_ms: u64, stale_after_ms: u64) -> bool {
        if !self.is_processing {
            return false;
        }
        match self.processing_since_ms {
            Some(since) => now_ms.saturating_sub(since) < stale_after_ms,
            None => false,
        }
    }

    pub fn acquire_lock(&mut self, now_ms: u64) {
        self.is_processing = true;
        self.processing_since_ms = Some(now_ms);
    }

    pub fn release_lock(&mut self) {
        self.is_processing = false;
        self.processing_since_ms = None;
    }

    /// Apply close fields. `pnl` is `(absolute, percent)` when an exit price is known.
    pub fn mark_closed(&mut self, reason: CloseReason, now_ms: u64, pnl: Option<(f64, f64)>) {
        self.status = PositionStatus::Closed;
        self.close_reason = Some(reason);
        self.closed_at_ms = Some(now_ms);
        if let Some((abs, pct)) = pnl {
            self.pnl = Some(abs);
            self.pnl_percent = Some(pct);
        }
        self.release_lock();
    }
}

fn position_key(
    exchange: ExchangeKind,
    bot_id: BotId,
    normalized_symbol: &str,
    side: PositionSide,
) -> String {
    format!("{exchange}_{bot_id}_{normalized_symbol}_{side}")
}

//! Pricing and side selection for the ocbot engine.
//!
//! Everything here is a pure function of its inputs. Invalid numeric input
//! never panics: price derivations return `None` (or `NaN` for the entry
//! extension) and the caller decides what to skip.
//!
//! - [`price`]: entry extension, take-profit, stop-loss, PnL
//! - [`trailing`]: per-minute trailing take-profit
//! - [`side`]: candle direction and strategy polarity to position side
//! - [`targets`]: TP/SL targets for a strategy and bot

pub mod price;
pub mod side;
pub mod targets;
pub mod trailing;

pub use price::{
    extended_entry_price, initial_stop_loss_by_risk_amount, initial_stop_loss_price, pnl_percent,
    realized_pnl, take_profit_price,
};
pub use side::{determine_side, determine_side_raw, Direction};
pub use targets::ExitTargets;
pub use trailing::next_trailing_take_profit;

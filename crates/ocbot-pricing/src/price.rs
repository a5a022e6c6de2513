//! Entry, exit and PnL price math.
//!
//! Strategy parameters use two conventions:
//! - `oc` and `extend` are plain percentages.
//! - `take_profit` and `stoploss` are per-mille. The take-profit offset is
//!   `oc * take_profit / 1000` percent; the stop-loss offset is
//!   `stoploss / 10` percent of entry.

use ocbot_core::PositionSide;

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

// ============================================================================
// Entry
// ============================================================================

/// Limit entry price extended against the candle move.
///
/// `delta = |current - open|`. A long entry sits `extend_pct` of `delta`
/// below `current`; a short entry sits the same distance above it.
/// Returns `NaN` if any input is non-finite.
pub fn extended_entry_price(current: f64, open: f64, extend_pct: f64, side: PositionSide) -> f64 {
    if !all_finite(&[current, open, extend_pct]) {
        return f64::NAN;
    }
    let delta = (current - open).abs();
    let ratio = extend_pct / 100.0;
    match side {
        PositionSide::Long => current - ratio * delta,
        PositionSide::Short => current + ratio * delta,
    }
}

// ============================================================================
// Exits
// ============================================================================

/// Take-profit price for a position opened at `entry`.
///
/// Returns `None` when the inputs are non-finite, the entry is not positive,
/// the offset is not positive, or a short target would reach zero.
pub fn take_profit_price(entry: f64, oc_pct: f64, tp_param: f64, side: PositionSide) -> Option<f64> {
    if !all_finite(&[entry, oc_pct, tp_param]) || entry <= 0.0 {
        return None;
    }
    let pct = oc_pct * tp_param / 1000.0;
    if pct <= 0.0 {
        return None;
    }
    let price = match side {
        PositionSide::Long => entry * (1.0 + pct / 100.0),
        PositionSide::Short => entry * (1.0 - pct / 100.0),
    };
    (price > 0.0).then_some(price)
}

/// Initial stop-loss price from the per-mille `sl_param`.
///
/// A zero or negative parameter disables the stop (`None`).
pub fn initial_stop_loss_price(entry: f64, sl_param: f64, side: PositionSide) -> Option<f64> {
    if !all_finite(&[entry, sl_param]) || entry <= 0.0 || sl_param <= 0.0 {
        return None;
    }
    let pct = sl_param / 10.0;
    let price = match side {
        PositionSide::Long => entry * (1.0 - pct / 100.0),
        PositionSide::Short => entry * (1.0 + pct / 100.0),
    };
    (price > 0.0).then_some(price)
}

/// Stop-loss price at which closing `quantity` loses exactly `risk_amount_usd`.
///
/// `price_diff = risk / quantity`; long stops sit below entry, short stops
/// above. Returns `None` for non-positive or non-finite inputs, and when the
/// result would not be a positive price strictly on the protective side of
/// entry.
pub fn initial_stop_loss_by_risk_amount(
    entry: f64,
    quantity: f64,
    risk_amount_usd: f64,
    side: PositionSide,
) -> Option<f64> {
    if !all_finite(&[entry, quantity, risk_amount_usd]) {
        return None;
    }
    if entry <= 0.0 || quantity <= 0.0 || risk_amount_usd <= 0.0 {
        return None;
    }
    let price_diff = risk_amount_usd / quantity;
    let stop = match side {
        PositionSide::Long => entry - price_diff,
        PositionSide::Short => entry + price_diff,
    };
    if !stop.is_finite() || stop <= 0.0 {
        return None;
    }
    let protective = match side {
        PositionSide::Long => stop < entry,
        PositionSide::Short => stop > entry,
    };
    protective.then_some(stop)
}

// ============================================================================
// PnL
// ============================================================================

/// Signed PnL in quote currency for closing `quantity` at `exit`.
pub fn realized_pnl(entry: f64, exit: f64, quantity: f64, side: PositionSide) -> f64 {
    (exit - entry) * quantity * side.sign()
}

/// Signed PnL as a percentage of entry. `None` when entry is not positive.
pub fn pnl_percent(entry: f64, exit: f64, side: PositionSide) -> Option<f64> {
    if !all_finite(&[entry, exit]) || entry <= 0.0 {
        return None;
    }
    Some((exit - entry) / entry * 100.0 * side.sign())
}

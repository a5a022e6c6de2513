//! Time-decaying trailing take-profit.
//!
//! The TP walks toward entry by a fixed fraction of the original
//! entry-to-TP range per elapsed minute. A long TP stops at entry. A short
//! TP keeps moving and may pass entry, turning the TP into an early
//! loss-cutting exit.

use ocbot_core::PositionSide;

/// Next trailing take-profit after `minutes_elapsed` minutes.
///
/// `step = |initial_tp - entry| * decay_pct_per_minute / 100 * max(1, minutes)`.
/// Returns `prev_tp` unchanged when the decay is not positive or any price is
/// non-finite.
pub fn next_trailing_take_profit(
    prev_tp: f64,
    entry: f64,
    initial_tp: f64,
    decay_pct_per_minute: f64,
    side: PositionSide,
    minutes_elapsed: u32,
) -> f64 {
    if !(prev_tp.is_finite() && entry.is_finite() && initial_tp.is_finite()) {
        return prev_tp;
    }
    if !decay_pct_per_minute.is_finite() || decay_pct_per_minute <= 0.0 {
        return prev_tp;
    }

    let total_range = (initial_tp - entry).abs();
    let minutes = f64::from(minutes_elapsed.max(1));
    let step = total_range * (decay_pct_per_minute / 100.0) * minutes;

    match side {
        PositionSide::Long => (prev_tp - step).max(entry),
        PositionSide::Short => prev_tp + step,
    }
}

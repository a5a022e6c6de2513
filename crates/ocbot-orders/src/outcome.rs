//! Results of scheduled order work.

use std::fmt;

/// Why a unit of work did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Row is closed, cancelled or still waiting for its entry fill.
    Inactive,
    /// Another worker holds a fresh soft lock.
    Locked,
    /// Neither a stored nor a derivable take-profit or stop-loss.
    NoTargets,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inactive => "inactive",
            Self::Locked => "locked",
            Self::NoTargets => "no_targets",
        })
    }
}

/// Result of one `tpsl:{position_id}` task.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// Exit orders placed or replaced. `None` means that leg was kept.
    Placed {
        tp_order_id: Option<String>,
        sl_order_id: Option<String>,
    },
    /// Ticker had already crossed the take-profit; closed at market.
    ClosedAtMarket { order_id: String },
    /// Exchange orders already match the targets.
    Unchanged,
    Skipped(SkipReason),
}

/// Result of one `trail:{position_id}` task.
#[derive(Debug, Clone, PartialEq)]
pub enum TrailOutcome {
    /// Take-profit moved; a replacement was scheduled.
    Moved { from: f64, to: f64 },
    /// Less than a minute since the last step.
    NotDue,
    /// Take-profit already at its clamp.
    Settled,
    Skipped(SkipReason),
}

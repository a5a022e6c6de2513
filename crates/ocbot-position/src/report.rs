//! Pass reports.

use ocbot_core::BotId;

/// What one bot's reconcile pass did. Counts only applied writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotSyncReport {
    /// Nonzero positions reported by the exchange.
    pub exchange_positions: usize,
    /// Active local rows at the start of the pass.
    pub local_positions: usize,
    pub materialized: usize,
    pub promoted: usize,
    pub closed_zero_size: usize,
    pub closed_missing: usize,
    /// Rows whose `not_on_exchange_count` was incremented.
    pub missing_counted: usize,
    /// Rows whose `not_on_exchange_count` was reset to zero.
    pub counters_reset: usize,
    pub exit_repairs: usize,
    pub exit_cancelled: usize,
    /// Exchange positions with neither an entry order nor a strategy.
    pub untracked: usize,
    /// Materializations abandoned because a row already existed.
    pub skipped_duplicate: usize,
    pub skipped_locked: usize,
    /// Versioned writes lost to another writer.
    pub conflicts: usize,
    pub failed_actions: usize,
}

impl BotSyncReport {
    /// Rows created or modified by the pass.
    pub fn writes(&self) -> usize {
        self.materialized
            + self.promoted
            + self.closed_zero_size
            + self.closed_missing
            + self.missing_counted
            + self.counters_reset
    }

    pub fn merge(&mut self, other: &BotSyncReport) {
        self.exchange_positions += other.exchange_positions;
        self.local_positions += other.local_positions;
        self.materialized += other.materialized;
        self.promoted += other.promoted;
        self.closed_zero_size += other.closed_zero_size;
        self.closed_missing += other.closed_missing;
        self.missing_counted += other.missing_counted;
        self.counters_reset += other.counters_reset;
        self.exit_repairs += other.exit_repairs;
        self.exit_cancelled += other.exit_cancelled;
        self.untracked += other.untracked;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_locked += other.skipped_locked;
        self.conflicts += other.conflicts;
        self.failed_actions += other.failed_actions;
    }
}

/// Outcome of a full pass over every registered bot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced_bots: Vec<BotId>,
    pub failed_bots: Vec<BotId>,
    pub totals: BotSyncReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncSummary),
    /// Another full pass held the re-entrancy guard.
    AlreadyRunning,
}

//! Short-lived exchange-position snapshots.
//!
//! Several tasks for the same bot often need a position snapshot within
//! the same burst. Snapshots are memoized per `(bot, symbol)` for
//! `ttl_ms`; a failed refresh falls back to the last good snapshot when one
//! exists.

use ocbot_core::{normalize_symbol, BotId, BoundedCache, ExchangePosition, SharedClock};
use ocbot_exchange::{ExchangeClient, ExchangeResult, Operation};
use ocbot_telemetry::Metrics;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Distinct `(bot, symbol)` snapshots kept.
const MAX_SNAPSHOTS: usize = 512;

/// `None` symbol means "all positions of the bot".
type SnapshotKey = (BotId, Option<String>);

#[derive(Debug, Clone)]
struct Snapshot {
    positions: Vec<ExchangePosition>,
    fetched_at_ms: u64,
}

/// TTL cache over `get_open_positions`.
pub struct SnapshotCache {
    ttl_ms: u64,
    clock: SharedClock,
    entries: Mutex<BoundedCache<SnapshotKey, Snapshot>>,
}

impl SnapshotCache {
    pub fn new(ttl_ms: u64, clock: SharedClock) -> Self {
        Self {
            ttl_ms,
            clock,
            entries: Mutex::new(BoundedCache::new(MAX_SNAPSHOTS)),
        }
    }

    /// Positions for `bot_id`, served from cache while fresh.
    pub async fn get_or_fetch(
        &self,
        bot_id: BotId,
        exchange: &dyn ExchangeClient,
        symbol: Option<&str>,
    ) -> ExchangeResult<Vec<ExchangePosition>> {
        let key: SnapshotKey = (bot_id, symbol.map(normalize_symbol));
        let now = self.clock.now_ms();

        if let Some(snapshot) = self.entries.lock().get(&key) {
            if now.saturating_sub(snapshot.fetched_at_ms) < self.ttl_ms {
                Metrics::snapshot_cache("hit");
                return Ok(snapshot.positions.clone());
            }
        }

        match exchange.get_open_positions(symbol).await {
            Ok(positions) => {
                Metrics::snapshot_cache("miss");
                self.entries.lock().insert(
                    key,
                    Snapshot {
                        positions: positions.clone(),
                        fetched_at_ms: self.clock.now_ms(),
                    },
                );
                Ok(positions)
            }
            Err(err) => {
                Metrics::exchange_error(Operation::GetOpenPositions.as_str(), err.kind.as_str());
                match self.entries.lock().peek(&key) {
                    Some(stale) => {
                        Metrics::snapshot_cache("stale");
                        warn!(
                            bot_id = %bot_id,
                            age_ms = now.saturating_sub(stale.fetched_at_ms),
                            error = %err,
                            "Position fetch failed, serving last good snapshot"
                        );
                        Ok(stale.positions.clone())
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Drop every snapshot of one bot.
    pub fn invalidate(&self, bot_id: BotId) {
        self.entries
            .lock()
            .retain(|(owner, _), _| *owner != bot_id);
        debug!(bot_id = %bot_id, "Snapshot cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

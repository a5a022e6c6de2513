//! Per-key log rate limiting.
//!
//! A warning for the same key (e.g. `fetch_failed:{bot_id}`) is emitted at
//! most once per window. Suppressed occurrences are counted and reported with
//! the next emission. Keys live in a [`BoundedCache`], so an unbounded stream
//! of distinct keys cannot grow memory.

use ocbot_core::{BoundedCache, SharedClock};
use parking_lot::Mutex;

/// Default number of keys tracked.
pub const DEFAULT_MAX_KEYS: usize = 1_024;

#[derive(Debug, Clone, Copy)]
struct Window {
    last_emit_ms: u64,
    suppressed: u64,
}

/// Message-frequency limiter for log lines.
pub struct LogThrottle {
    window_ms: u64,
    clock: SharedClock,
    windows: Mutex<BoundedCache<String, Window>>,
}

impl LogThrottle {
    pub fn new(window_ms: u64, clock: SharedClock) -> Self {
        Self::with_capacity(window_ms, DEFAULT_MAX_KEYS, clock)
    }

    pub fn with_capacity(window_ms: u64, max_keys: usize, clock: SharedClock) -> Self {
        Self {
            window_ms,
            clock,
            windows: Mutex::new(BoundedCache::new(max_keys)),
        }
    }

    /// Check whether a line for `key` may be emitted now.
    ///
    /// Returns `Some(suppressed)` when the caller should log, where
    /// `suppressed` counts the occurrences swallowed since the previous
    /// emission. Returns `None` while the key is inside its window.
    pub fn check(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        let mut windows = self.windows.lock();
        let key = key.to_string();

        if let Some(window) = windows.get_mut(&key) {
            if now.saturating_sub(window.last_emit_ms) < self.window_ms {
                window.suppressed += 1;
                return None;
            }
            let suppressed = window.suppressed;
            window.last_emit_ms = now;
            window.suppressed = 0;
            return Some(suppressed);
        }

        windows.insert(
            key,
            Window {
                last_emit_ms: now,
                suppressed: 0,
            },
        );
        Some(0)
    }

    /// Forget a key, e.g. once the condition it reported has cleared.
    pub fn reset(&self, key: &str) {
        self.windows.lock().remove(&key.to_string());
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

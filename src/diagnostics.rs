//! Rate-limited warning suppression
//!
//! Rejections are expected and frequent; a misbehaving backend must not
//! flood the log, and a storm from one backend must not silence warnings
//! about a different one. Emission times are tracked per key, where a key
//! combines the failure kind with the backend id (or transport source),
//! e.g. `auth-lobby-1` or `poll-error-survival`.

use dashmap::DashMap;

/// Fixed suppression window per warning key.
pub const WARN_COOLDOWN_MS: i64 = 10_000;

/// Tracks the last emission time per warning key.
#[derive(Debug, Default)]
pub struct WarnLimiter {
    last_emitted: DashMap<String, i64>,
}

impl WarnLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when a warning for `key` should be emitted now, and
    /// records the emission. The check and the record happen under the
    /// entry lock, so concurrent callers for one key emit at most once
    /// per cooldown window.
    pub fn should_emit(&self, key: &str, now_ms: i64) -> bool {
        match self.last_emitted.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if now_ms - *entry.get() < WARN_COOLDOWN_MS {
                    return false;
                }
                entry.insert(now_ms);
                true
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now_ms);
                true
            }
        }
    }
}

//! Query-time aggregation over the state store
//!
//! Runs on every ping the proxy answers, so it is a pure reduction over a
//! snapshot: no hidden state, identical results for identical inputs.

use crate::config::{BridgeConfig, MaxPlayersMode};
use crate::store::BackendState;

/// Combined figures for one ping response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateResult {
    /// Sum of `online_total` over live backends, capped at `i32::MAX`
    /// (the proxy ping field is a 32-bit int)
    pub online_total: i32,
    /// Capacity to report, or `None` to keep the proxy's own capacity
    pub max_players: Option<i32>,
}

/// Reduces a store snapshot into the combined count. A backend is live
/// when its last receipt time is within `stale_after_ms` of `now_ms`,
/// boundary included; stale backends contribute nothing but stay in the
/// store and resume counting as soon as they report again.
pub fn aggregate(states: &[BackendState], now_ms: i64, config: &BridgeConfig) -> AggregateResult {
    let mut total_sum: i64 = 0;
    let mut max_override: i32 = 0;

    for state in states {
        if now_ms.saturating_sub(state.last_seen_ms) <= config.stale_after_ms {
            total_sum = total_sum.saturating_add(state.online_total as i64);
            max_override = max_override.max(state.max_players_override);
        }
    }

    let online_total = total_sum.min(i32::MAX as i64) as i32;
    let max_players = match config.max_players_mode {
        MaxPlayersMode::Keep => None,
        MaxPlayersMode::UseMaxOverride => {
            let effective = if config.max_players_override > 0 {
                config.max_players_override
            } else {
                max_override
            };
            (effective > 0).then_some(effective)
        }
    };

    AggregateResult {
        online_total,
        max_players,
    }
}

//! Wire-level and normalized report types for backend player counts

use serde::Deserialize;

/// Raw count report as decoded from a transport payload. Untrusted input:
/// every field defaults when missing and no invariants hold until the
/// report has passed through [`crate::validate::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountReport {
    /// Protocol identifier the sender claims to speak
    #[serde(default)]
    pub protocol: String,
    /// Backend identifier; may be empty, in which case the transport's
    /// fallback id (if any) is substituted during validation
    #[serde(default)]
    pub server_id: String,
    /// Backend-chosen report timestamp in milliseconds; treated as an
    /// opaque monotonically-intended counter, never compared to our clock
    #[serde(default)]
    pub timestamp_ms: i64,
    #[serde(default)]
    pub online_humans: i64,
    #[serde(default)]
    pub online_ai: i64,
    #[serde(default)]
    pub online_total: i64,
    #[serde(default)]
    pub max_players_override: i64,
    /// Authorization token; only ever logged masked
    #[serde(default)]
    pub auth: String,
}

/// A report that passed validation and normalization. Immutable once
/// constructed; counts are non-negative and `online_total` is at least
/// `online_humans + online_ai`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCount {
    /// Non-empty backend identifier, the store key
    pub server_id: String,
    /// Timestamp the backend claimed, used only for per-backend ordering
    pub timestamp_ms: i64,
    pub online_humans: i32,
    pub online_ai: i32,
    pub online_total: i32,
    pub max_players_override: i32,
    /// Local wall-clock at acceptance, used for the liveness window
    pub received_at_ms: i64,
}

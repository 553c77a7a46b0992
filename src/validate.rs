//! Validation pipeline for incoming count reports
//!
//! Pure functions: a raw [`CountReport`] plus the immutable config and the
//! backend's prior stored timestamp go in, and either a [`Rejection`] or a
//! normalized record plus normalization notes come out. The checks run in
//! a fixed order and short-circuit at the first failure so every rejection
//! maps to one diagnostic code.
//!
//! The ordering check here is only a pre-check; the authoritative decision
//! is re-made under the entry lock in [`crate::store::CountStore::upsert`].

use crate::config::{AuthMode, BridgeConfig};
use crate::report::{CountReport, NormalizedCount};
use thiserror::Error;

/// Why a report was not accepted. `OutOfOrder` is the odd one out: it is
/// not a malformed-input condition, merely a late duplicate, and callers
/// treat it as an accepted no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Payload missing server_id; ignoring.")]
    MissingServerId,
    #[error("Protocol mismatch for server {server_id} (expected {expected}, received {received}).")]
    ProtocolMismatch {
        server_id: String,
        expected: String,
        received: String,
    },
    #[error("Rejected payload for server {server_id} due to auth failure (auth={auth_preview}).")]
    Unauthorized {
        server_id: String,
        /// Masked token preview; the raw token is never logged
        auth_preview: String,
    },
    #[error("Server {server_id} not in allowlist; ignoring payload.")]
    NotAllowlisted { server_id: String },
    #[error("Out-of-order payload for {server_id} ignored ({incoming} < {last}).")]
    OutOfOrder {
        server_id: String,
        incoming: i64,
        last: i64,
    },
}

impl Rejection {
    /// Diagnostics key, scoped per backend id so one backend's storm
    /// cannot silence warnings about another. Identity failures have no
    /// backend id yet and scope by transport source instead.
    pub fn warn_key(&self, source: &str) -> String {
        match self {
            Rejection::MissingServerId => format!("missing-server-id-{source}"),
            Rejection::ProtocolMismatch { server_id, .. } => format!("protocol-{server_id}"),
            Rejection::Unauthorized { server_id, .. } => format!("auth-{server_id}"),
            Rejection::NotAllowlisted { server_id } => format!("allowlist-{server_id}"),
            Rejection::OutOfOrder { server_id, .. } => format!("out-of-order-{server_id}"),
        }
    }
}

/// Non-rejecting normalization findings, surfaced as rate-limited warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    NegativeValues {
        humans: i64,
        ai: i64,
        total: i64,
        max_override: i64,
    },
    AiOverCap {
        reported: i32,
        cap: i32,
    },
    TotalUnderflow {
        reported: i32,
        humans: i32,
        ai: i32,
        corrected: i32,
    },
}

/// A report that passed every check.
#[derive(Debug, Clone)]
pub struct Validated {
    pub count: NormalizedCount,
    pub notes: Vec<Note>,
}

/// Resolves the effective backend id: the trimmed `server_id` field, or
/// the transport's trimmed fallback id when the field is empty.
pub fn resolve_server_id(report: &CountReport, fallback_id: Option<&str>) -> Option<String> {
    let id = report.server_id.trim();
    if !id.is_empty() {
        return Some(id.to_string());
    }
    let fallback = fallback_id.unwrap_or("").trim();
    if fallback.is_empty() {
        None
    } else {
        Some(fallback.to_string())
    }
}

/// Runs the full pipeline: identity, protocol, authorization, allowlist,
/// normalization, ordering. On success the returned count carries
/// `now_ms` as its receipt time and is ready for upsert.
pub fn validate(
    report: &CountReport,
    fallback_id: Option<&str>,
    config: &BridgeConfig,
    prior_timestamp_ms: Option<i64>,
    now_ms: i64,
) -> Result<Validated, Rejection> {
    let server_id = resolve_server_id(report, fallback_id).ok_or(Rejection::MissingServerId)?;

    if report.protocol != config.protocol {
        return Err(Rejection::ProtocolMismatch {
            server_id,
            expected: config.protocol.clone(),
            received: report.protocol.clone(),
        });
    }

    if !is_authorized(&server_id, &report.auth, config) {
        return Err(Rejection::Unauthorized {
            auth_preview: mask_auth(&report.auth),
            server_id,
        });
    }

    if config.allowlist_enabled && !config.allowed_server_ids.contains(&server_id) {
        return Err(Rejection::NotAllowlisted { server_id });
    }

    let mut notes = Vec::new();
    if report.online_humans < 0
        || report.online_ai < 0
        || report.online_total < 0
        || report.max_players_override < 0
    {
        notes.push(Note::NegativeValues {
            humans: report.online_humans,
            ai: report.online_ai,
            total: report.online_total,
            max_override: report.max_players_override,
        });
    }

    let online_humans = clamp_count(report.online_humans);
    let mut online_ai = clamp_count(report.online_ai);
    let mut online_total = clamp_count(report.online_total);
    let max_players_override = clamp_count(report.max_players_override);

    let ai_cap = if config.max_players_override > 0 {
        config.max_players_override
    } else {
        max_players_override
    };
    if ai_cap > 0 && online_ai > ai_cap {
        notes.push(Note::AiOverCap {
            reported: online_ai,
            cap: ai_cap,
        });
        online_ai = ai_cap;
    }

    let min_total = online_humans.saturating_add(online_ai);
    if online_total < min_total {
        notes.push(Note::TotalUnderflow {
            reported: online_total,
            humans: online_humans,
            ai: online_ai,
            corrected: min_total,
        });
        online_total = min_total;
    }
    // With an active cap the total is pinned to exactly humans+ai, even
    // when the report carried consistent headroom above it. Without a cap
    // a larger total is allowed to stand.
    if ai_cap > 0 && online_total > min_total {
        online_total = min_total;
    }

    if let Some(last) = prior_timestamp_ms {
        if report.timestamp_ms < last {
            return Err(Rejection::OutOfOrder {
                server_id,
                incoming: report.timestamp_ms,
                last,
            });
        }
    }

    Ok(Validated {
        count: NormalizedCount {
            server_id,
            timestamp_ms: report.timestamp_ms,
            online_humans,
            online_ai,
            online_total,
            max_players_override,
            received_at_ms: now_ms,
        },
        notes,
    })
}

fn is_authorized(server_id: &str, auth: &str, config: &BridgeConfig) -> bool {
    match config.auth_mode {
        AuthMode::Global => !config.global_token.is_empty() && config.global_token == auth,
        AuthMode::PerServer => config
            .server_tokens
            .get(server_id)
            .map(|expected| expected == auth)
            .unwrap_or(false),
    }
}

fn clamp_count(value: i64) -> i32 {
    value.clamp(0, i32::MAX as i64) as i32
}

/// Masked token preview for diagnostics: first two and last two
/// characters, `****` for short tokens, `<empty>` when absent.
pub fn mask_auth(auth: &str) -> String {
    if auth.is_empty() {
        return "<empty>".to_string();
    }
    let chars: Vec<char> = auth.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}...{tail}")
}

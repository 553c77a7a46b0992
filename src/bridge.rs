//! Shared ingestion entry point and query surface
//!
//! Every transport funnels raw payload bytes through [`Bridge::deliver`]:
//! JSON decode, validation, upsert, and diagnostics happen in one place
//! instead of once per transport. The proxy's ping handler reads the
//! combined figure back through [`Bridge::ping_values`].

use crate::aggregate::{aggregate, AggregateResult};
use crate::config::BridgeConfig;
use crate::debug_log::DebugLogger;
use crate::diagnostics::WarnLimiter;
use crate::now_ms;
use crate::report::{CountReport, NormalizedCount};
use crate::store::CountStore;
use crate::transport::TransportAck;
use crate::validate::{resolve_server_id, validate, Note, Rejection};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Bridge {
    config: Arc<BridgeConfig>,
    store: CountStore,
    warnings: WarnLimiter,
    debug_log: Option<DebugLogger>,
    /// Cleared by startup faults; every entry point short-circuits on it
    enabled: AtomicBool,
}

impl Bridge {
    /// Builds the bridge; a configuration startup fault leaves it disabled.
    pub fn new(config: Arc<BridgeConfig>, debug_log: Option<DebugLogger>) -> Self {
        let enabled = config.startup_fault().is_none();
        Self {
            config,
            store: CountStore::new(),
            warnings: WarnLimiter::new(),
            debug_log,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &CountStore {
        &self.store
    }

    /// Ingests one raw report from a transport. `source` scopes
    /// diagnostics (`socket`, `push-message`, `http:<endpoint>`);
    /// `fallback_id` substitutes for an empty `server_id` field.
    ///
    /// Out-of-order reports and upserts lost to a concurrent newer writer
    /// both ack `Ok`: they are late duplicates, not sender errors.
    pub fn deliver(&self, raw: &[u8], source: &str, fallback_id: Option<&str>) -> TransportAck {
        if !self.is_enabled() {
            return TransportAck::Invalid;
        }
        let now = now_ms();

        let report: CountReport = match serde_json::from_slice(raw) {
            Ok(report) => report,
            Err(error) => {
                if self.warnings.should_emit(&format!("invalid-json-{source}"), now) {
                    warn!("Invalid JSON payload from {source}.");
                }
                self.trace(&format!(
                    "Payload rejected: invalid JSON. source={source} error={error}"
                ));
                return TransportAck::Invalid;
            }
        };

        let prior = resolve_server_id(&report, fallback_id)
            .and_then(|id| self.store.last_timestamp_ms(&id));

        match validate(&report, fallback_id, &self.config, prior, now) {
            Ok(validated) => {
                for note in &validated.notes {
                    self.warn_note(note, &validated.count.server_id, now);
                }
                let count = validated.count;
                self.trace(&format!(
                    "Payload validated. source={} server_id={} timestamp_ms={} humans={} ai={} total={} max_override={}",
                    source,
                    count.server_id,
                    count.timestamp_ms,
                    count.online_humans,
                    count.online_ai,
                    count.online_total,
                    count.max_players_override
                ));
                self.commit(count, source);
                TransportAck::Ok
            }
            Err(rejection @ Rejection::OutOfOrder { .. }) => {
                if self.config.debug {
                    debug!("{rejection}");
                }
                self.trace(&format!(
                    "Payload ignored: out-of-order timestamp. source={source} {rejection}"
                ));
                TransportAck::Ok
            }
            Err(rejection) => {
                if self.warnings.should_emit(&rejection.warn_key(source), now) {
                    warn!("{rejection}");
                }
                self.trace(&format!("Payload rejected. source={source} {rejection}"));
                match rejection {
                    Rejection::MissingServerId => TransportAck::Invalid,
                    Rejection::ProtocolMismatch { .. } => TransportAck::ProtocolMismatch,
                    Rejection::Unauthorized { .. } => TransportAck::Unauthorized,
                    Rejection::NotAllowlisted { .. } => TransportAck::NotAllowlisted,
                    Rejection::OutOfOrder { .. } => TransportAck::Ok,
                }
            }
        }
    }

    /// Computes the combined figure for a ping response, or `None` when
    /// the bridge is disabled and the proxy should keep its own values.
    pub fn ping_values(&self, now_ms: i64) -> Option<AggregateResult> {
        if !self.is_enabled() {
            return None;
        }
        let snapshot = self.store.snapshot();
        Some(aggregate(&snapshot, now_ms, &self.config))
    }

    fn commit(&self, count: NormalizedCount, source: &str) {
        let server_id = count.server_id.clone();
        let summary = format!(
            "total={} humans={} ai={} max_override={}",
            count.online_total, count.online_humans, count.online_ai, count.max_players_override
        );
        if self.store.upsert(count) {
            if self.config.debug {
                debug!("Accepted payload for {server_id}: {summary}");
            }
            self.trace(&format!(
                "Payload accepted. source={source} server_id={server_id} {summary}"
            ));
        } else {
            // A concurrent writer committed a newer timestamp between the
            // validation pre-check and this upsert.
            self.trace(&format!(
                "Payload ignored: superseded during upsert. source={source} server_id={server_id}"
            ));
        }
    }

    fn warn_note(&self, note: &Note, server_id: &str, now: i64) {
        match note {
            Note::NegativeValues {
                humans,
                ai,
                total,
                max_override,
            } => {
                if self
                    .warnings
                    .should_emit(&format!("negative-values-{server_id}"), now)
                {
                    warn!(
                        "Negative player counts reported by {server_id} (humans={humans}, ai={ai}, total={total}, max_override={max_override})."
                    );
                }
            }
            Note::AiOverCap { reported, cap } => {
                if self
                    .warnings
                    .should_emit(&format!("ai-over-cap-{server_id}"), now)
                {
                    warn!(
                        "Reported AI count for {server_id} ({reported}) exceeds max_players_override ({cap}); capping."
                    );
                }
            }
            Note::TotalUnderflow {
                reported,
                humans,
                ai,
                corrected,
            } => {
                if self
                    .warnings
                    .should_emit(&format!("total-underflow-{server_id}"), now)
                {
                    warn!(
                        "Payload total lower than humans+ai for {server_id} (total={reported}, humans={humans}, ai={ai}); correcting to {corrected}."
                    );
                }
            }
        }
    }

    /// Traces the effective configuration once at startup.
    pub fn trace_startup(&self) {
        let config = &self.config;
        self.trace(&format!(
            "Bridge initialized. channel={} protocol={} auth_mode={:?} allowlist_enabled={} max_players_mode={:?} max_players_override={} stale_after_ms={}",
            config.channel,
            config.protocol,
            config.auth_mode,
            config.allowlist_enabled,
            config.max_players_mode,
            config.max_players_override,
            config.stale_after_ms
        ));
    }

    /// Rate-limited warning for transport-level failures that never reach
    /// the validation pipeline (poll errors, HTTP statuses).
    pub(crate) fn warn_rate_limited(&self, key: &str, message: &str) {
        if self.warnings.should_emit(key, now_ms()) {
            warn!("{message}");
        }
    }

    pub(crate) fn trace(&self, message: &str) {
        if let Some(debug_log) = &self.debug_log {
            debug_log.log(message);
        }
    }
}

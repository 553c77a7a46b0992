//! # Player Count Bridge
//!
//! Aggregates live player-count reports from independent backend servers
//! and exposes one combined figure for a front proxy's status/ping
//! response. Backends push JSON reports over a local stream socket, a
//! push-message channel, or an HTTP endpoint the bridge polls; the bridge
//! keeps last-known-good state per backend and answers "what is the
//! current combined count" on demand with bounded staleness.
//!
//! ## Architecture
//!
//! The core is an ingestion-validation-aggregation engine with no central
//! transaction log:
//!
//! - [`validate`]: a stateless pipeline turning a raw decoded report plus
//!   authorization context into either a named rejection or a normalized,
//!   timestamped record.
//! - [`store`]: a concurrent per-backend map with an ordering-guarded,
//!   per-entry-atomic upsert. This is the only mutation point.
//! - [`aggregate`]: a pure reduction of a store snapshot into the
//!   combined total, filtered by the liveness window. Runs on every ping.
//! - [`diagnostics`]: per-(kind, backend) warning suppression so
//!   misbehaving backends cannot flood the log or silence each other.
//!
//! Transports ([`transport`]) are thin glue: decode bytes, call
//! [`Bridge::deliver`], serialize an ack where the protocol has one.
//! Validation runs lock-free and in parallel; the authoritative ordering
//! decision is re-made under the entry lock at upsert time, so concurrent
//! reports for one backend serialize correctly while different backends
//! never contend.
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use count_bridge::{now_ms, Bridge, BridgeConfig};
//! use std::sync::Arc;
//!
//! let config = Arc::new(BridgeConfig::default());
//! let bridge = Arc::new(Bridge::new(config, None));
//!
//! // Transport side: hand raw payload bytes to the bridge.
//! let ack = bridge.deliver(br#"{"server_id":"lobby-1"}"#, "socket", None);
//!
//! // Proxy side: read the combined figure while answering a ping.
//! if let Some(result) = bridge.ping_values(now_ms()) {
//!     println!("online: {}", result.online_total);
//! }
//! ```

pub mod aggregate;
pub mod bridge;
pub mod config;
pub mod debug_log;
pub mod diagnostics;
pub mod planner;
pub mod report;
pub mod store;
pub mod transport;
pub mod validate;

pub use aggregate::AggregateResult;
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use report::{CountReport, NormalizedCount};
pub use transport::TransportAck;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as i64
}

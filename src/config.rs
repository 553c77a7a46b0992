//! Configuration loading and normalization
//!
//! The bridge reads `config.yml` from its data directory, writing an
//! embedded commented default when the file does not exist. Mode strings
//! parse leniently (unknown values fall back to the defaults) and numeric
//! floors are clamped, so a hand-edited config degrades gracefully instead
//! of failing to load. The loaded [`BridgeConfig`] is immutable for the
//! process lifetime and shared by reference across all components.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Commented default configuration written on first start.
const DEFAULT_CONFIG: &str = r#"# Player count bridge configuration.

# Push-message channel backends publish their counts on.
channel: "aiplayers:count"
# Protocol identifier every report must carry.
protocol: "aiplayers-count-v1"
# Backends whose last accepted report is older than this stop counting.
stale_after_ms: 30000
debug: false

# "global" checks every report against global_token;
# "per_server" checks against the server_tokens entry for the backend.
auth_mode: "per_server"
global_token: ""
server_tokens:
#  lobby-1: "change-me"

allowlist_enabled: true
allowed_server_ids: []
#  - lobby-1

# "keep" leaves the proxy's capacity untouched; "use_max_override" reports
# the largest override seen (or max_players_override when set).
max_players_mode: "keep"
max_players_override: 0

socket:
  enabled: false
  path: "count-bridge.sock"

polling:
  enabled: false
  interval_seconds: 10
  request_timeout_ms: 2000
  endpoints:
#    lobby-1:
#      url: "http://127.0.0.1:8085/count"
#      auth_header: "Bearer change-me"

planner_api:
  enabled: false
  bind_address: "127.0.0.1"
  port: 8765
  plan_path: "/planner/plan"
  engagement_path: "/planner/engagement"
  auth_token: ""
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Global,
    PerServer,
}

impl AuthMode {
    /// Lenient parse; unknown values fall back to per-server auth.
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" => AuthMode::Global,
            _ => AuthMode::PerServer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxPlayersMode {
    Keep,
    UseMaxOverride,
}

impl MaxPlayersMode {
    /// Lenient parse; `max_of_overrides` is a historical alias.
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "use_max_override" | "max_of_overrides" => MaxPlayersMode::UseMaxOverride,
            _ => MaxPlayersMode::Keep,
        }
    }
}

/// One HTTP endpoint the poll transport fetches counts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingEndpoint {
    pub url: String,
    /// Sent verbatim as the `Authorization` header when non-empty
    pub auth_header: String,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub enabled: bool,
    /// Floor of 1 second
    pub interval_seconds: u64,
    /// Floor of 250 ms
    pub request_timeout_ms: u64,
    /// Endpoint id -> endpoint; the id doubles as the fallback server id
    pub endpoints: HashMap<String, PollingEndpoint>,
}

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

/// Experimental planner API surface; see [`crate::planner`].
#[derive(Debug, Clone)]
pub struct PlannerApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    pub plan_path: String,
    pub engagement_path: String,
    /// Empty token disables request authentication
    pub auth_token: String,
}

/// Immutable bridge configuration, shared by all components after load.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub channel: String,
    pub protocol: String,
    pub stale_after_ms: i64,
    pub debug: bool,
    pub auth_mode: AuthMode,
    pub global_token: String,
    pub server_tokens: HashMap<String, String>,
    pub allowlist_enabled: bool,
    pub allowed_server_ids: HashSet<String>,
    pub max_players_mode: MaxPlayersMode,
    pub max_players_override: i32,
    pub polling: PollingConfig,
    pub socket: SocketConfig,
    pub planner_api: PlannerApiConfig,
}

impl BridgeConfig {
    /// Returns the misconfiguration that disables the whole bridge, if any.
    /// A partially-configured bridge never runs: global auth mode with no
    /// token would otherwise silently reject every report.
    pub fn startup_fault(&self) -> Option<&'static str> {
        if self.auth_mode == AuthMode::Global && self.global_token.is_empty() {
            return Some("auth_mode is set to global but global_token is empty.");
        }
        None
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        RawConfig::default().into_config()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Loads `config.yml` from the data directory, creating the directory and
/// writing the embedded default file when missing.
pub fn load(data_dir: &Path) -> Result<BridgeConfig, ConfigError> {
    fs::create_dir_all(data_dir).map_err(|source| ConfigError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;
    let config_path = data_dir.join("config.yml");
    if !config_path.exists() {
        fs::write(&config_path, DEFAULT_CONFIG).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
    }
    let contents = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
        path: config_path.clone(),
        source,
    })?;
    let raw: RawConfig = if contents.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path,
            source,
        })?
    };
    Ok(raw.into_config())
}

// Raw deserialization shapes. Every field is optional so a sparse config
// file works; defaults and clamping are applied in into_config.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    channel: Option<String>,
    protocol: Option<String>,
    stale_after_ms: Option<i64>,
    debug: Option<bool>,
    auth_mode: Option<String>,
    global_token: Option<String>,
    server_tokens: Option<HashMap<String, String>>,
    allowlist_enabled: Option<bool>,
    allowed_server_ids: Option<Vec<String>>,
    max_players_mode: Option<String>,
    max_players_override: Option<i64>,
    polling: RawPolling,
    socket: RawSocket,
    planner_api: RawPlanner,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPolling {
    enabled: Option<bool>,
    interval_seconds: Option<u64>,
    request_timeout_ms: Option<u64>,
    endpoints: Option<HashMap<String, RawEndpoint>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEndpoint {
    url: Option<String>,
    auth_header: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSocket {
    enabled: Option<bool>,
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlanner {
    enabled: Option<bool>,
    bind_address: Option<String>,
    port: Option<u16>,
    plan_path: Option<String>,
    engagement_path: Option<String>,
    auth_token: Option<String>,
}

impl RawConfig {
    fn into_config(self) -> BridgeConfig {
        let allowed_server_ids = self
            .allowed_server_ids
            .unwrap_or_default()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        let mut endpoints = HashMap::new();
        for (id, raw) in self.polling.endpoints.unwrap_or_default() {
            let id = id.trim().to_string();
            let url = raw.url.unwrap_or_default().trim().to_string();
            if id.is_empty() || url.is_empty() {
                continue;
            }
            let auth_header = raw.auth_header.unwrap_or_default().trim().to_string();
            endpoints.insert(id, PollingEndpoint { url, auth_header });
        }

        BridgeConfig {
            channel: self.channel.unwrap_or_else(|| "aiplayers:count".to_string()),
            protocol: self
                .protocol
                .unwrap_or_else(|| "aiplayers-count-v1".to_string()),
            stale_after_ms: self.stale_after_ms.unwrap_or(30_000),
            debug: self.debug.unwrap_or(false),
            auth_mode: AuthMode::parse(self.auth_mode.as_deref().unwrap_or("per_server")),
            global_token: self.global_token.unwrap_or_default(),
            server_tokens: self.server_tokens.unwrap_or_default(),
            allowlist_enabled: self.allowlist_enabled.unwrap_or(true),
            allowed_server_ids,
            max_players_mode: MaxPlayersMode::parse(
                self.max_players_mode.as_deref().unwrap_or("keep"),
            ),
            max_players_override: self
                .max_players_override
                .unwrap_or(0)
                .clamp(0, i32::MAX as i64) as i32,
            polling: PollingConfig {
                enabled: self.polling.enabled.unwrap_or(false),
                interval_seconds: self.polling.interval_seconds.unwrap_or(10).max(1),
                request_timeout_ms: self.polling.request_timeout_ms.unwrap_or(2_000).max(250),
                endpoints,
            },
            socket: SocketConfig {
                enabled: self.socket.enabled.unwrap_or(false),
                path: self
                    .socket
                    .path
                    .unwrap_or_else(|| PathBuf::from("count-bridge.sock")),
            },
            planner_api: PlannerApiConfig {
                enabled: self.planner_api.enabled.unwrap_or(false),
                bind_address: self
                    .planner_api
                    .bind_address
                    .unwrap_or_else(|| "127.0.0.1".to_string()),
                port: self.planner_api.port.unwrap_or(8765),
                plan_path: self
                    .planner_api
                    .plan_path
                    .unwrap_or_else(|| "/planner/plan".to_string()),
                engagement_path: self
                    .planner_api
                    .engagement_path
                    .unwrap_or_else(|| "/planner/engagement".to_string()),
                auth_token: self.planner_api.auth_token.unwrap_or_default(),
            },
        }
    }
}

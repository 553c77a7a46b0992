//! HTTP polling transport
//!
//! Periodically fetches each configured endpoint and feeds the body to
//! the bridge with the endpoint id as the fallback server id. Request
//! failures, timeouts, and non-2xx statuses are transport faults: they
//! are warned about (rate-limited) and the cycle moves on without
//! touching the core.

use crate::bridge::Bridge;
use crate::config::PollingEndpoint;
use log::{error, info};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Poll loop over all configured endpoints; returns immediately when
/// polling is disabled or no endpoints are configured.
pub async fn run(bridge: Arc<Bridge>) {
    let polling = bridge.config().polling.clone();
    if !polling.enabled {
        return;
    }
    if polling.endpoints.is_empty() {
        log::warn!("Polling enabled but no endpoints configured; skipping poller.");
        return;
    }
    let client = match Client::builder()
        .timeout(Duration::from_millis(polling.request_timeout_ms))
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            error!("Failed to build polling HTTP client: {error}");
            return;
        }
    };
    info!(
        "HTTP polling enabled: {} endpoints every {}s.",
        polling.endpoints.len(),
        polling.interval_seconds
    );

    let mut ticker = interval(Duration::from_secs(polling.interval_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !bridge.is_enabled() {
            continue;
        }
        for (endpoint_id, endpoint) in &polling.endpoints {
            poll_endpoint(&bridge, &client, endpoint_id, endpoint).await;
        }
    }
}

/// Fetches one endpoint and delivers the body. Public so the poll cycle
/// can be driven directly from tests.
pub async fn poll_endpoint(
    bridge: &Bridge,
    client: &Client,
    endpoint_id: &str,
    endpoint: &PollingEndpoint,
) {
    let mut request = client.get(&endpoint.url).header(ACCEPT, "application/json");
    if !endpoint.auth_header.is_empty() {
        request = request.header(AUTHORIZATION, endpoint.auth_header.clone());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(error) => {
            bridge.warn_rate_limited(
                &format!("poll-error-{endpoint_id}"),
                &format!("Polling failed for {endpoint_id}: {error}"),
            );
            bridge.trace(&format!(
                "Polling error. endpoint_id={endpoint_id} error={error}"
            ));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        bridge.warn_rate_limited(
            &format!("poll-status-{endpoint_id}"),
            &format!("Polling status {status} for {endpoint_id}."),
        );
        bridge.trace(&format!(
            "Polling rejected: HTTP status. endpoint_id={endpoint_id} status={status}"
        ));
        return;
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(error) => {
            bridge.warn_rate_limited(
                &format!("poll-error-{endpoint_id}"),
                &format!("Polling failed for {endpoint_id}: {error}"),
            );
            return;
        }
    };

    bridge.deliver(&body, &format!("http:{endpoint_id}"), Some(endpoint_id));
}

//! Experimental planner API (stub)
//!
//! An administrative HTTP surface kept behind its own interface, separate
//! from the ingestion core. The handler authenticates requests and echoes
//! back an empty action list; the planning logic itself does not exist
//! yet. Minimal HTTP/1.1 handling over a plain TCP listener is all a
//! stub needs.

use crate::bridge::Bridge;
use crate::config::PlannerApiConfig;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Largest request body the stub will read.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct PlannerRequest {
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlannerResponse {
    request_id: Option<String>,
    actions: Vec<PlannerAction>,
}

/// Action shape the planner will eventually emit; the stub never
/// produces any.
#[derive(Debug, Serialize)]
struct PlannerAction {
    bot_id: String,
    send_after_ms: i64,
    message: String,
    visibility: String,
}

/// Binds the configured address and serves until aborted.
pub async fn run(bridge: Arc<Bridge>) -> std::io::Result<()> {
    let config = &bridge.config().planner_api;
    let listener = TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
    info!(
        "Planner API listening on {}:{} (plan_path={}, engagement_path={}).",
        config.bind_address, config.port, config.plan_path, config.engagement_path
    );
    serve(bridge, listener).await
}

/// Accept loop over an already-bound listener.
pub async fn serve(bridge: Arc<Bridge>, listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            if let Err(error) = handle_connection(bridge, stream).await {
                debug!("Planner API connection closed: {error}");
            }
        });
    }
}

async fn handle_connection(bridge: Arc<Bridge>, stream: TcpStream) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(());
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    let mut authorization = String::new();
    let mut header_token = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.parse().unwrap_or(0),
                "authorization" => authorization = value.to_string(),
                "x-auth-token" => header_token = value.to_string(),
                _ => {}
            }
        }
    }

    let config = &bridge.config().planner_api;
    if path != config.plan_path && path != config.engagement_path {
        return respond(&mut writer, 404, "not_found", "text/plain").await;
    }
    if !method.eq_ignore_ascii_case("POST") {
        return respond(&mut writer, 405, "method_not_allowed", "text/plain").await;
    }
    if !is_authorized(config, &authorization, &header_token) {
        return respond(&mut writer, 401, "unauthorized", "text/plain").await;
    }

    let mut body = vec![0u8; content_length.min(MAX_BODY_BYTES)];
    reader.read_exact(&mut body).await?;
    let body = String::from_utf8_lossy(&body);
    if body.trim().is_empty() {
        return respond(&mut writer, 400, "invalid", "text/plain").await;
    }
    let request: PlannerRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return respond(&mut writer, 400, "invalid", "text/plain").await,
    };

    bridge.trace(&format!(
        "Planner request handled. path={} request_id={:?}",
        path, request.request_id
    ));
    let response = PlannerResponse {
        request_id: request.request_id,
        actions: Vec::new(),
    };
    let json = serde_json::to_string(&response)
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error))?;
    respond(&mut writer, 200, &json, "application/json").await
}

fn is_authorized(config: &PlannerApiConfig, authorization: &str, header_token: &str) -> bool {
    if config.auth_token.is_empty() {
        return true;
    }
    if authorization == format!("Bearer {}", config.auth_token) {
        return true;
    }
    header_token == config.auth_token
}

async fn respond(
    writer: &mut (impl AsyncWriteExt + Unpin),
    status: u16,
    body: &str,
    content_type: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await
}

//! Integration tests for the player-count bridge
//!
//! These tests validate cross-component interactions and real transport
//! behavior: ack tokens over a Unix socket, polling against a stub HTTP
//! server, push-channel filtering, and the planner API stub.

use count_bridge::bridge::Bridge;
use count_bridge::config::{BridgeConfig, MaxPlayersMode, PollingEndpoint};
use count_bridge::transport::push::PushMessage;
use count_bridge::transport::{poll, push, socket};
use count_bridge::{now_ms, planner, TransportAck};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::mpsc;

fn test_bridge() -> Arc<Bridge> {
    let mut config = BridgeConfig::default();
    config.allowlist_enabled = false;
    config
        .server_tokens
        .insert("lobby-1".to_string(), "token-1".to_string());
    config
        .server_tokens
        .insert("survival".to_string(), "token-2".to_string());
    Arc::new(Bridge::new(Arc::new(config), None))
}

fn payload(server_id: &str, auth: &str, timestamp_ms: i64, total: i32) -> String {
    format!(
        r#"{{"protocol":"aiplayers-count-v1","server_id":"{server_id}","timestamp_ms":{timestamp_ms},"online_humans":{total},"online_ai":0,"online_total":{total},"max_players_override":0,"auth":"{auth}"}}"#
    )
}

/// SOCKET TRANSPORT TESTS
mod socket_tests {
    use super::*;

    async fn start_socket_bridge(
        bridge: Arc<Bridge>,
    ) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(socket::serve(bridge, listener));
        (dir, path)
    }

    async fn send_line(stream: &mut UnixStream, line: &str) -> String {
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();
        let mut response = String::new();
        let mut reader = BufReader::new(stream);
        reader.read_line(&mut response).await.unwrap();
        response.trim().to_string()
    }

    #[tokio::test]
    async fn ack_tokens_over_socket() {
        let bridge = test_bridge();
        let (_dir, path) = start_socket_bridge(Arc::clone(&bridge)).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let ack = send_line(&mut stream, &payload("lobby-1", "token-1", 100, 7)).await;
        assert_eq!(ack, "ok");
        assert_eq!(bridge.store().get("lobby-1").unwrap().online_total, 7);

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let ack = send_line(&mut stream, &payload("lobby-1", "wrong", 200, 7)).await;
        assert_eq!(ack, "unauthorized");

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let bad_protocol =
            payload("lobby-1", "token-1", 200, 7).replace("aiplayers-count-v1", "v2");
        let ack = send_line(&mut stream, &bad_protocol).await;
        assert_eq!(ack, "protocol_mismatch");

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let ack = send_line(&mut stream, "{broken json").await;
        assert_eq!(ack, "invalid");
    }

    #[tokio::test]
    async fn allowlist_token_over_socket() {
        let mut config = BridgeConfig::default();
        config.allowlist_enabled = true;
        config
            .server_tokens
            .insert("lobby-1".to_string(), "token-1".to_string());
        let bridge = Arc::new(Bridge::new(Arc::new(config), None));
        let (_dir, path) = start_socket_bridge(Arc::clone(&bridge)).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let ack = send_line(&mut stream, &payload("lobby-1", "token-1", 100, 7)).await;
        assert_eq!(ack, "not_allowlisted");
        assert!(bridge.store().is_empty());
    }

    #[tokio::test]
    async fn multiple_reports_per_connection() {
        let bridge = test_bridge();
        let (_dir, path) = start_socket_bridge(Arc::clone(&bridge)).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        for timestamp in [100, 200, 300] {
            let ack = send_line(
                &mut stream,
                &payload("lobby-1", "token-1", timestamp, timestamp as i32),
            )
            .await;
            assert_eq!(ack, "ok");
        }
        // Late duplicate still acks ok but changes nothing.
        let ack = send_line(&mut stream, &payload("lobby-1", "token-1", 150, 1)).await;
        assert_eq!(ack, "ok");
        let state = bridge.store().get("lobby-1").unwrap();
        assert_eq!(state.last_timestamp_ms, 300);
        assert_eq!(state.online_total, 300);
    }
}

/// HTTP POLL TRANSPORT TESTS
mod poll_tests {
    use super::*;

    /// One-shot HTTP stub: accepts a single connection and answers with
    /// the given status and body.
    async fn http_stub(status_line: &'static str, body: String) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 2048];
            let _ = stream.read(&mut buffer).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });
        addr
    }

    #[tokio::test]
    async fn poll_ingests_body_with_fallback_id() {
        let bridge = test_bridge();
        // Body carries no server_id; the endpoint id substitutes.
        let body = payload("", "token-1", 100, 5);
        let addr = http_stub("200 OK", body).await;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(2_000))
            .build()
            .unwrap();
        let endpoint = PollingEndpoint {
            url: format!("http://{addr}/count"),
            auth_header: String::new(),
        };
        poll::poll_endpoint(&bridge, &client, "lobby-1", &endpoint).await;
        assert_eq!(bridge.store().get("lobby-1").unwrap().online_total, 5);
    }

    #[tokio::test]
    async fn non_2xx_status_skips_cycle() {
        let bridge = test_bridge();
        let addr = http_stub("503 Service Unavailable", String::new()).await;
        let client = reqwest::Client::new();
        let endpoint = PollingEndpoint {
            url: format!("http://{addr}/count"),
            auth_header: String::new(),
        };
        poll::poll_endpoint(&bridge, &client, "lobby-1", &endpoint).await;
        assert!(bridge.store().is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_fault() {
        let bridge = test_bridge();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let endpoint = PollingEndpoint {
            // Reserved port with nothing listening.
            url: "http://127.0.0.1:1/count".to_string(),
            auth_header: String::new(),
        };
        poll::poll_endpoint(&bridge, &client, "lobby-1", &endpoint).await;
        assert!(bridge.store().is_empty());
    }
}

/// PUSH CHANNEL TRANSPORT TESTS
mod push_tests {
    use super::*;

    #[tokio::test]
    async fn push_messages_filtered_and_ingested() {
        let bridge = test_bridge();
        let (sender, receiver) = mpsc::channel::<PushMessage>(16);
        let task = tokio::spawn(push::run(Arc::clone(&bridge), receiver));

        sender
            .send(PushMessage {
                channel: "wrong:channel".to_string(),
                data: payload("lobby-1", "token-1", 100, 3).into_bytes(),
                from_backend: true,
            })
            .await
            .unwrap();
        sender
            .send(PushMessage {
                channel: "aiplayers:count".to_string(),
                data: payload("lobby-1", "token-1", 100, 3).into_bytes(),
                from_backend: false,
            })
            .await
            .unwrap();
        sender
            .send(PushMessage {
                channel: "aiplayers:count".to_string(),
                data: payload("lobby-1", "token-1", 100, 3).into_bytes(),
                from_backend: true,
            })
            .await
            .unwrap();
        drop(sender);
        task.await.unwrap();

        // Only the last message survives both filters.
        let state = bridge.store().get("lobby-1").unwrap();
        assert_eq!(state.online_total, 3);
        assert_eq!(bridge.store().len(), 1);
    }
}

/// PLANNER API STUB TESTS
mod planner_tests {
    use super::*;

    async fn start_planner(bridge: Arc<Bridge>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(planner::serve(bridge, listener));
        addr
    }

    async fn raw_request(addr: std::net::SocketAddr, request: String) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn echoes_empty_action_list() {
        let addr = start_planner(test_bridge()).await;
        let body = r#"{"request_id":"req-7"}"#;
        let request = format!(
            "POST /planner/plan HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let response = raw_request(addr, request).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains(r#""request_id":"req-7""#));
        assert!(response.contains(r#""actions":[]"#));
    }

    #[tokio::test]
    async fn rejects_non_post_and_bad_body() {
        let addr = start_planner(test_bridge()).await;
        let response = raw_request(
            addr,
            "GET /planner/plan HTTP/1.1\r\nHost: x\r\n\r\n".to_string(),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 405"));

        let response = raw_request(
            addr,
            "POST /planner/plan HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n".to_string(),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400"));

        let response = raw_request(
            addr,
            "POST /nowhere HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n".to_string(),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn enforces_auth_token() {
        let mut config = BridgeConfig::default();
        config.planner_api.auth_token = "s3cret".to_string();
        let bridge = Arc::new(Bridge::new(Arc::new(config), None));
        let addr = start_planner(bridge).await;

        let body = r#"{"request_id":"req-1"}"#;
        let unauthorized = format!(
            "POST /planner/plan HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let response = raw_request(addr, unauthorized).await;
        assert!(response.starts_with("HTTP/1.1 401"));

        let authorized = format!(
            "POST /planner/plan HTTP/1.1\r\nHost: x\r\nAuthorization: Bearer s3cret\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let response = raw_request(addr, authorized).await;
        assert!(response.starts_with("HTTP/1.1 200"));
    }
}

/// END-TO-END PIPELINE TESTS
mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn reports_from_multiple_backends_aggregate() {
        let bridge = test_bridge();
        assert_eq!(
            bridge.deliver(
                payload("lobby-1", "token-1", 100, 20).as_bytes(),
                "socket",
                None
            ),
            TransportAck::Ok
        );
        assert_eq!(
            bridge.deliver(
                payload("survival", "token-2", 100, 17).as_bytes(),
                "socket",
                None
            ),
            TransportAck::Ok
        );
        let result = bridge.ping_values(now_ms()).unwrap();
        assert_eq!(result.online_total, 37);
        assert_eq!(result.max_players, None);
    }

    #[tokio::test]
    async fn max_override_mode_reports_capacity() {
        let mut config = BridgeConfig::default();
        config.allowlist_enabled = false;
        config.max_players_mode = MaxPlayersMode::UseMaxOverride;
        config
            .server_tokens
            .insert("lobby-1".to_string(), "token-1".to_string());
        let bridge = Arc::new(Bridge::new(Arc::new(config), None));

        let report = r#"{"protocol":"aiplayers-count-v1","server_id":"lobby-1","timestamp_ms":1,"online_humans":2,"online_ai":0,"online_total":2,"max_players_override":64,"auth":"token-1"}"#;
        assert_eq!(
            bridge.deliver(report.as_bytes(), "socket", None),
            TransportAck::Ok
        );
        let result = bridge.ping_values(now_ms()).unwrap();
        assert_eq!(result.online_total, 2);
        assert_eq!(result.max_players, Some(64));
    }

    #[tokio::test]
    async fn concurrent_delivery_keeps_ordering_invariant() {
        let bridge = test_bridge();
        let mut handles = Vec::new();
        for timestamp in 0..100i64 {
            let bridge = Arc::clone(&bridge);
            handles.push(tokio::spawn(async move {
                bridge.deliver(
                    payload("lobby-1", "token-1", timestamp, timestamp as i32).as_bytes(),
                    "socket",
                    None,
                );
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let state = bridge.store().get("lobby-1").unwrap();
        // The committed state always matches its own timestamp, whatever
        // interleaving the scheduler produced.
        assert_eq!(state.online_total as i64, state.last_timestamp_ms);
    }
}

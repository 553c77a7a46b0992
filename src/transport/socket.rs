//! Unix stream socket transport
//!
//! Backends connect to a local socket path and write newline-terminated
//! JSON reports; each report is answered with one newline-terminated ack
//! token. One task per connection; a slow or broken connection never
//! affects the others.

use crate::bridge::Bridge;
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{sleep, Duration};

/// Binds the socket path (unlinking a stale socket file first) and serves
/// connections until the task is aborted. A bind failure is returned to
/// the caller as a transport fault; it does not crash the process.
pub async fn run(bridge: Arc<Bridge>, path: PathBuf) -> std::io::Result<()> {
    if path.exists() {
        // Leftover from an unclean shutdown; bind would fail otherwise.
        let _ = std::fs::remove_file(&path);
    }
    let listener = UnixListener::bind(&path)?;
    info!("Socket transport listening on {}", path.display());
    serve(bridge, listener).await
}

/// Accept loop over an already-bound listener.
pub async fn serve(bridge: Arc<Bridge>, listener: UnixListener) -> std::io::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let bridge = Arc::clone(&bridge);
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(bridge, stream).await {
                        debug!("Socket connection closed: {error}");
                    }
                });
            }
            Err(error) => {
                error!("Failed to accept socket connection: {error}");
                sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn handle_connection(bridge: Arc<Bridge>, stream: UnixStream) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let ack = bridge.deliver(line.as_bytes(), "socket", None);
        writer.write_all(ack.token().as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

/// Removes the socket file on shutdown so the next start binds cleanly.
pub fn cleanup(path: &Path) {
    let _ = std::fs::remove_file(path);
}

//! Push-message channel transport
//!
//! An embedding host forwards discrete messages from its upstream
//! connections into an mpsc channel; this task filters them by channel
//! name and source, then hands the payload bytes to the bridge.
//! Fire-and-forget: no acknowledgement is sent back.

use crate::bridge::Bridge;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One discrete message from the host's messaging layer.
#[derive(Debug, Clone)]
pub struct PushMessage {
    /// Named channel the message arrived on
    pub channel: String,
    /// Raw payload bytes (expected: one JSON report)
    pub data: Vec<u8>,
    /// Whether the message originated from a backend server connection,
    /// as opposed to a player client relaying arbitrary bytes
    pub from_backend: bool,
}

/// Consumes messages until the sender side closes.
pub async fn run(bridge: Arc<Bridge>, mut messages: mpsc::Receiver<PushMessage>) {
    while let Some(message) = messages.recv().await {
        handle_message(&bridge, message);
    }
}

fn handle_message(bridge: &Bridge, message: PushMessage) {
    if !bridge.is_enabled() {
        return;
    }
    let expected_channel = &bridge.config().channel;
    if &message.channel != expected_channel {
        debug!(
            "Push message ignored: channel mismatch (received {}, expected {}).",
            message.channel, expected_channel
        );
        bridge.trace(&format!(
            "Push message ignored: channel mismatch. received_channel={} expected_channel={}",
            message.channel, expected_channel
        ));
        return;
    }
    if !message.from_backend {
        debug!("Push message ignored: source is not a backend connection.");
        bridge.trace("Push message ignored: source is not a backend connection.");
        return;
    }
    bridge.trace(&format!(
        "Push message received. channel={} bytes={}",
        message.channel,
        message.data.len()
    ));
    // No response channel exists on this transport; the ack is dropped.
    let _ = bridge.deliver(&message.data, "push-message", None);
}

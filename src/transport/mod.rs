//! Transport glue: each variant delivers raw payload bytes to the shared
//! ingestion entry point and serializes an acknowledgement per its own
//! protocol. None of the transports touch the core state directly.

pub mod poll;
pub mod push;
#[cfg(unix)]
pub mod socket;

/// Per-report acknowledgement returned by [`crate::Bridge::deliver`].
/// The socket transport writes the token back verbatim; push and poll
/// transports discard it (fire-and-forget / nothing to answer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAck {
    Ok,
    Invalid,
    Unauthorized,
    ProtocolMismatch,
    NotAllowlisted,
}

impl TransportAck {
    /// Wire token for transports with a response channel.
    pub fn token(self) -> &'static str {
        match self {
            TransportAck::Ok => "ok",
            TransportAck::Invalid => "invalid",
            TransportAck::Unauthorized => "unauthorized",
            TransportAck::ProtocolMismatch => "protocol_mismatch",
            TransportAck::NotAllowlisted => "not_allowlisted",
        }
    }
}

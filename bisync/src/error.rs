//! Protocol and transport error types.

use thiserror::Error;

/// One protocol-level failure, reported through the `on_error` callback.
///
/// None of these stop the engine; it returns to idle and continues with the
/// next queued message. [`ProtocolError::code`] yields the stable numeric
/// code, the `Display` form the description.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// ENQ went unanswered on a retry-eligible attempt.
    #[error("no ACK for too long after {attempt} attempt(s) before sending the message")]
    NoAckBeforeMessage { attempt: u8 },

    /// ENQ went unanswered after every retry; the message was dropped.
    #[error("remote peer is not responding")]
    RemotePeerNotResponding,

    /// The transmitted frame went unacknowledged; the message was dropped.
    #[error("no ACK for too long after sending the message")]
    NoAckAfterMessage,

    /// The peer was granted transmission but no complete frame arrived in
    /// time.
    #[error("no message for too long, going to idle by force")]
    NoMessageTooLong,

    /// The received frame was acknowledged but no EOT arrived in time.
    #[error("no EOT for too long, going to idle by force")]
    NoEotTooLong,

    /// The peer refused with NAK.
    #[error("remote peer didn't acknowledge transmission")]
    PeerNotAcknowledge,

    /// The received checksum does not match the one computed locally.
    #[error("checksum error: expected {expected:#04x}, received {received:#04x}")]
    ChecksumError { expected: u8, received: u8 },

    /// The peer sent ENQ while we were awaiting the ACK for our own ENQ.
    #[error("collision: ENQ received while waiting for an ACK")]
    CollisionDetected,

    /// Any unclassified internal fault.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ProtocolError {
    /// Stable numeric code for this failure kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::NoAckBeforeMessage { .. } => 1,
            Self::RemotePeerNotResponding => 2,
            Self::NoAckAfterMessage => 3,
            Self::NoMessageTooLong => 4,
            Self::NoEotTooLong => 5,
            Self::PeerNotAcknowledge => 6,
            Self::ChecksumError { .. } => 7,
            Self::CollisionDetected => 8,
            Self::Unknown(_) => -1,
        }
    }
}

/// Transport and facade errors, surfaced from the `open`/`write` path.
#[derive(Debug, Error)]
pub enum Error {
    /// The serial device could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Raw I/O failure on the underlying stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The link is closed; the engine is no longer running.
    #[error("link closed")]
    Closed,
}

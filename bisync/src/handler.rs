//! Response handlers, one per protocol phase that waits on the peer.
//!
//! Exactly one handler is attached while an exchange is in flight. A handler
//! names the byte pattern its phase waits for and carries the state that
//! phase accumulates; the engine dispatches transitions on the variant and
//! arms the phase timer when it attaches the handler.

use std::time::Duration;

use crate::config::Timings;
use crate::frame::FrameParser;

/// The four wait-phases of one ENQ/ACK/MESSAGE/EOT exchange.
#[derive(Debug)]
pub enum Handler {
    /// Sent ENQ, waiting for the peer to grant with ACK.
    EnqForAck,
    /// Sent the frame, waiting for the peer to confirm with ACK.
    MessageForAck,
    /// Granted the peer's ENQ, waiting for the framed message. Owns the
    /// bytes accumulated so far; detaching drops them.
    AckForMessage(FrameParser),
    /// Confirmed the peer's frame, waiting for EOT.
    AckForEot,
}

impl Handler {
    /// Expiration interval for this phase. The post-ENQ wait stretches on
    /// retry attempts.
    pub fn interval(&self, timings: &Timings, attempt: u8) -> Duration {
        match self {
            Handler::EnqForAck => timings.enq_ack_interval(attempt),
            Handler::MessageForAck => timings.msg_ack,
            Handler::AckForMessage(_) => timings.ack_msg,
            Handler::AckForEot => timings.ack_eot,
        }
    }

    /// Short phase name used in traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Handler::EnqForAck => "ENQ_ACK",
            Handler::MessageForAck => "MSG_ACK",
            Handler::AckForMessage(_) => "ACK_MSG",
            Handler::AckForEot => "ACK_EOT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enq_phase_follows_the_retry_schedule() {
        let timings = Timings::default();
        assert_eq!(Handler::EnqForAck.interval(&timings, 0), timings.enq_ack);
        assert_eq!(Handler::EnqForAck.interval(&timings, 1), timings.retry);
        assert_eq!(Handler::EnqForAck.interval(&timings, 2), timings.retry);
    }

    #[test]
    fn each_phase_uses_its_own_interval() {
        let timings = Timings::default();
        assert_eq!(
            Handler::MessageForAck.interval(&timings, 0),
            timings.msg_ack
        );
        assert_eq!(
            Handler::AckForMessage(FrameParser::new(FrameParser::shape())).interval(&timings, 0),
            timings.ack_msg
        );
        assert_eq!(Handler::AckForEot.interval(&timings, 0), timings.ack_eot);
    }
}

//! Frame construction and inbound frame recognition.
//!
//! One frame on the wire is `STX payload ETX bcc`, where `bcc` is the XOR of
//! every payload byte and ETX. STX is not covered by the checksum. Payload
//! bytes are never escaped, so payloads containing STX or ETX are not
//! supported.

use regex::bytes::Regex;

/// Enquiry: requests permission to transmit one frame.
pub const ENQ: u8 = 0x05;
/// Acknowledge: grants an ENQ or confirms a received frame.
pub const ACK: u8 = 0x06;
/// Negative acknowledge: refuses an exchange or rejects a frame.
pub const NAK: u8 = 0x15;
/// Start of text: first byte of a frame.
pub const STX: u8 = 0x02;
/// End of text: last byte of a frame before the checksum.
pub const ETX: u8 = 0x03;
/// End of transmission: closes one complete exchange.
pub const EOT: u8 = 0x04;

/// XOR block check character over `payload || ETX`.
pub fn bcc(payload: &[u8]) -> u8 {
    payload.iter().fold(ETX, |acc, byte| acc ^ byte)
}

/// One outbound frame, checksummed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
    bcc: u8,
}

impl Frame {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let bcc = bcc(&payload);
        Self { payload, bcc }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Wire encoding: `STX payload ETX bcc`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 3);
        out.push(STX);
        out.extend_from_slice(&self.payload);
        out.push(ETX);
        out.push(self.bcc);
        out
    }
}

/// A frame cut from the inbound byte stream. Checksums are compared by the
/// engine, which decides whether a mismatch is tolerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub payload: Vec<u8>,
    pub received_bcc: u8,
    pub computed_bcc: u8,
}

impl InboundFrame {
    pub fn checksum_ok(&self) -> bool {
        self.received_bcc == self.computed_bcc
    }
}

/// Accumulates inbound bytes until they form one complete frame.
///
/// The accepted shape is `STX <payload> ETX <bcc>` with a non-empty payload
/// and exactly one checksum byte; the whole buffer is re-matched on every
/// push. Bytes preceding STX never match and are cleared by the receive
/// phase timeout.
#[derive(Debug)]
pub struct FrameParser {
    shape: Regex,
    buf: Vec<u8>,
}

impl FrameParser {
    pub fn new(shape: Regex) -> Self {
        Self {
            shape,
            buf: Vec::new(),
        }
    }

    /// The compiled frame shape. `(?s-u)` makes `.` match every byte.
    pub fn shape() -> Regex {
        Regex::new(r"(?s-u)\A\x02(?P<message>.+)\x03(?P<checksum>.)\z")
            .expect("frame shape pattern is valid")
    }

    /// Feed one byte; returns the completed frame once the buffer matches.
    pub fn push(&mut self, byte: u8) -> Option<InboundFrame> {
        self.buf.push(byte);
        let (payload, received_bcc) = {
            let caps = self.shape.captures(&self.buf)?;
            (caps["message"].to_vec(), caps["checksum"][0])
        };
        self.buf.clear();
        let computed_bcc = bcc(&payload);
        Some(InboundFrame {
            payload,
            received_bcc,
            computed_bcc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Option<InboundFrame> {
        let mut parser = FrameParser::new(FrameParser::shape());
        let mut result = None;
        for &byte in bytes {
            assert!(result.is_none(), "frame completed before the last byte");
            result = parser.push(byte);
        }
        result
    }

    #[test]
    fn bcc_of_a_is_0x42() {
        assert_eq!(bcc(b"A"), 0x42);
    }

    #[test]
    fn bcc_of_hi_is_0x02() {
        assert_eq!(bcc(b"HI"), 0x02);
    }

    #[test]
    fn encode_frames_payload_between_stx_and_etx() {
        assert_eq!(Frame::new(*b"A").encode(), vec![0x02, 0x41, 0x03, 0x42]);
    }

    #[test]
    fn parser_completes_on_checksum_byte() {
        let frame = parse(&[STX, b'H', b'I', ETX, 0x02]).expect("complete frame");
        assert_eq!(frame.payload, b"HI");
        assert_eq!(frame.received_bcc, 0x02);
        assert!(frame.checksum_ok());
    }

    #[test]
    fn parser_reports_checksum_mismatch() {
        let frame = parse(&[STX, b'H', b'I', ETX, 0x00]).expect("complete frame");
        assert!(!frame.checksum_ok());
        assert_eq!(frame.computed_bcc, 0x02);
        assert_eq!(frame.received_bcc, 0x00);
    }

    #[test]
    fn parser_handles_checksum_byte_equal_to_etx() {
        // A zeroed payload checksums to the ETX value itself.
        let payload = [0x00, 0x00];
        assert_eq!(bcc(&payload), ETX);
        let frame = parse(&[STX, 0x00, 0x00, ETX, ETX]).expect("complete frame");
        assert_eq!(frame.payload, payload);
        assert!(frame.checksum_ok());
    }

    #[test]
    fn round_trip_matches_original_payload() {
        for payload in [&b"A"[..], b"HI", b"hello world", &[0xff, 0x00, 0x7f]] {
            let encoded = Frame::new(payload).encode();
            let frame = parse(&encoded).expect("complete frame");
            assert_eq!(frame.payload, payload);
            assert!(frame.checksum_ok());
        }
    }

    #[test]
    fn parser_keeps_accumulating_until_the_shape_matches() {
        let mut parser = FrameParser::new(FrameParser::shape());
        assert!(parser.push(STX).is_none());
        assert!(parser.push(b'A').is_none());
        assert!(parser.push(ETX).is_none());
        assert!(parser.push(0x42).is_some());
    }
}

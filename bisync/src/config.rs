//! Serial line configuration and protocol tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many times an unanswered ENQ is retried before giving up.
pub const MAX_RETRY: u8 = 2;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> u8 {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(format!("invalid data bits: {other}")),
        }
    }
}

/// Parity bit generation and checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

/// Stop bit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl From<StopBits> for f32 {
    fn from(bits: StopBits) -> f32 {
        match bits {
            StopBits::One => 1.0,
            StopBits::OnePointFive => 1.5,
            StopBits::Two => 2.0,
        }
    }
}

impl TryFrom<f32> for StopBits {
    type Error = String;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        if value == 1.0 {
            Ok(StopBits::One)
        } else if value == 1.5 {
            Ok(StopBits::OnePointFive)
        } else if value == 2.0 {
            Ok(StopBits::Two)
        } else {
            Err(format!("invalid stop bits: {value}"))
        }
    }
}

/// Serial line parameters. Immutable while the port is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    /// Baud rate; must be a rate the platform supports.
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Phase expiration intervals and the retry budget.
///
/// Defaults are the production values; tests and unusual links may shorten
/// or stretch them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// ENQ to ACK wait on the first attempt.
    pub enq_ack: Duration,
    /// ENQ to ACK wait on each retry attempt.
    pub retry: Duration,
    /// Frame to ACK wait after transmitting.
    pub msg_ack: Duration,
    /// ACK to frame wait while receiving.
    pub ack_msg: Duration,
    /// ACK to EOT wait after receiving.
    pub ack_eot: Duration,
    /// Retry budget for unanswered ENQs.
    pub max_retry: u8,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            enq_ack: Duration::from_millis(250),
            retry: Duration::from_millis(1500),
            msg_ack: Duration::from_millis(500),
            ack_msg: Duration::from_millis(100),
            ack_eot: Duration::from_millis(125),
            max_retry: MAX_RETRY,
        }
    }
}

impl Timings {
    /// Interval for the ENQ to ACK wait on the given attempt; attempt 0 is
    /// the first send.
    pub fn enq_ack_interval(&self, attempt: u8) -> Duration {
        if attempt == 0 {
            self.enq_ack
        } else {
            self.retry
        }
    }
}

/// Behavior knobs for one link.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Deliver frames whose checksum does not match instead of rejecting
    /// them. A long-standing workaround for noisy lines; with `false`,
    /// mismatches are reported and answered with NAK.
    pub ignore_checksum_errors: bool,
    /// Phase timers and retry budget.
    pub timings: Timings,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            ignore_checksum_errors: true,
            timings: Timings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_bits_round_trip_through_u8() {
        for bits in [DataBits::Five, DataBits::Six, DataBits::Seven, DataBits::Eight] {
            assert_eq!(DataBits::try_from(u8::from(bits)), Ok(bits));
        }
        assert!(DataBits::try_from(9).is_err());
    }

    #[test]
    fn stop_bits_round_trip_through_f32() {
        for bits in [StopBits::One, StopBits::OnePointFive, StopBits::Two] {
            assert_eq!(StopBits::try_from(f32::from(bits)), Ok(bits));
        }
        assert!(StopBits::try_from(0.5).is_err());
    }

    #[test]
    fn config_loads_from_json_with_defaults() {
        let config: SerialConfig = serde_json::from_str(
            r#"{"path": "/dev/ttyUSB0", "baud_rate": 19200, "parity": "even", "stop_bits": 2}"#,
        )
        .expect("valid config");
        assert_eq!(config.path, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
    }

    #[test]
    fn retry_schedule_stretches_after_the_first_attempt() {
        let timings = Timings::default();
        assert_eq!(timings.enq_ack_interval(0), Duration::from_millis(250));
        assert_eq!(timings.enq_ack_interval(1), Duration::from_millis(1500));
        assert_eq!(timings.enq_ack_interval(2), Duration::from_millis(1500));
    }
}

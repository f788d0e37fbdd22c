//! Point-to-point BSC-style link over an asynchronous serial port.
//!
//! One side queues application messages. The transport frames each one as
//! `STX payload ETX bcc`, negotiates the line with ENQ, transmits the frame
//! once the peer grants with ACK, waits for the confirming ACK and closes
//! the exchange with EOT. Symmetrically it grants inbound handshakes,
//! validates framed messages against their checksum and hands the payloads
//! to the application.
//!
//! Architecture: serial port → reader task → engine task → writer task →
//! serial port. The engine task owns every piece of protocol state (state
//! machine, outbound queue, retry counter, phase timer), so nothing is
//! locked.
//!
//! ```no_run
//! use bisync::{Bisync, LinkOptions, SerialConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bisync::Error> {
//!     let config = SerialConfig {
//!         path: "/dev/ttyUSB0".into(),
//!         ..SerialConfig::default()
//!     };
//!     let link = Bisync::open(&config, LinkOptions::default())?;
//!     link.on_read(|payload| {
//!         println!("<< {}", String::from_utf8_lossy(&payload));
//!     })
//!     .await?;
//!     link.write("PING").await?;
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod frame;
mod handler;
mod link;
mod transport;

pub use config::{DataBits, LinkOptions, Parity, SerialConfig, StopBits, Timings, MAX_RETRY};
pub use error::{Error, ProtocolError};
pub use frame::{bcc, Frame, ACK, ENQ, EOT, ETX, NAK, STX};
pub use link::Bisync;

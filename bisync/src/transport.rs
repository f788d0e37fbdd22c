//! Serial port opening and the I/O halves.
//!
//! The reader task owns the read half of the stream and forwards chunks to
//! the engine in port order; the writer task drains the outbound queue in
//! emission order. Neither task touches engine state.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

use crate::config::{DataBits, Parity, SerialConfig, StopBits};
use crate::error::Error;

/// Open the configured device raw: binary, no echo, no flow control.
pub(crate) fn open(config: &SerialConfig) -> Result<SerialStream, Error> {
    let data_bits = match config.data_bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    };
    let parity = match config.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
        // The serial layer has no way to express these; refuse rather than
        // silently downgrade.
        Parity::Mark | Parity::Space => {
            return Err(Error::Serial(tokio_serial::Error::new(
                tokio_serial::ErrorKind::InvalidInput,
                "mark/space parity is not supported on this platform",
            )))
        }
    };
    let stop_bits = match config.stop_bits {
        StopBits::One => tokio_serial::StopBits::One,
        // POSIX knows no 1.5 stop bits; the line is set to two.
        StopBits::OnePointFive | StopBits::Two => tokio_serial::StopBits::Two,
    };

    let stream = tokio_serial::new(config.path.as_str(), config.baud_rate)
        .data_bits(data_bits)
        .parity(parity)
        .stop_bits(stop_bits)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()?;
    Ok(stream)
}

/// Spawn the reader and writer halves of `stream`.
///
/// The reader ends on EOF or a read error and closes the engine's inbound
/// channel behind it; the writer ends when the engine drops the outbound
/// sender.
pub(crate) fn spawn_io<S>(
    stream: S,
    inbound: mpsc::Sender<Vec<u8>>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) -> (JoinHandle<()>, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let read_task = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("transport closed");
                    break;
                }
                Ok(n) => {
                    if inbound.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, "transport read failed");
                    break;
                }
            }
        }
    });

    let write_task = tokio::spawn(async move {
        while let Some(chunk) = outbound.recv().await {
            if let Err(error) = writer.write_all(&chunk).await {
                warn!(%error, "transport write failed");
                break;
            }
            if let Err(error) = writer.flush().await {
                warn!(%error, "transport flush failed");
                break;
            }
        }
    });

    (read_task, write_task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_forwards_chunks_in_order() {
        let (near, far) = tokio::io::duplex(64);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let _tasks = spawn_io(near, inbound_tx, outbound_rx);

        let (_, mut far_writer) = tokio::io::split(far);
        far_writer.write_all(&[0x05]).await.unwrap();
        far_writer.write_all(&[0x02, 0x41]).await.unwrap();

        let mut received = Vec::new();
        while received.len() < 3 {
            received.extend(inbound_rx.recv().await.expect("reader alive"));
        }
        assert_eq!(received, vec![0x05, 0x02, 0x41]);
    }

    #[tokio::test]
    async fn writer_drains_the_outbound_queue() {
        let (near, far) = tokio::io::duplex(64);
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let _tasks = spawn_io(near, inbound_tx, outbound_rx);

        outbound_tx.send(vec![0x05]).unwrap();
        outbound_tx.send(vec![0x02, 0x41, 0x03, 0x42]).unwrap();

        let (mut far_reader, _) = tokio::io::split(far);
        let mut received = [0u8; 5];
        far_reader.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [0x05, 0x02, 0x41, 0x03, 0x42]);
    }
}

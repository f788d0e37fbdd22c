//! The public link facade: composes the serial transport with the engine.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{LinkOptions, SerialConfig};
use crate::engine::{Command, Engine};
use crate::error::{Error, ProtocolError};
use crate::transport;

/// One end of a point-to-point link.
///
/// Messages queue in transmission order; each is framed, negotiated with
/// the ENQ/ACK handshake, transmitted, confirmed and closed with EOT.
/// Failed exchanges are reported through [`Bisync::on_error`] and never
/// block the next queued message.
///
/// Install the callbacks before the peer starts talking; payloads received
/// earlier are discarded. Dropping the handle closes the link.
pub struct Bisync {
    commands: mpsc::Sender<Command>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bisync {
    /// Open the configured serial device and start the link.
    pub fn open(config: &SerialConfig, options: LinkOptions) -> Result<Self, Error> {
        let stream = transport::open(config)?;
        debug!(path = %config.path, baud = config.baud_rate, "serial port open");
        Ok(Self::attach(stream, options))
    }

    /// Run the link over any duplex byte stream. Useful for in-memory pairs
    /// and PTY-backed tooling.
    pub fn attach<S>(stream: S, options: LinkOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let (read_task, write_task) = transport::spawn_io(stream, inbound_tx, outbound_rx);
        let engine = Engine::new(options, command_rx, inbound_rx, outbound_tx);
        let engine_task = tokio::spawn(engine.run());

        Self {
            commands: command_tx,
            tasks: vec![engine_task, read_task, write_task],
        }
    }

    /// Queue one payload for transmission. Transmission starts at once when
    /// the link is idle.
    pub async fn write(&self, payload: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.send(Command::Write(vec![payload.into()])).await
    }

    /// Queue several payloads; they are negotiated back to back, in order.
    pub async fn write_many<I, P>(&self, payloads: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let payloads: Vec<Vec<u8>> = payloads.into_iter().map(Into::into).collect();
        if payloads.is_empty() {
            return Ok(());
        }
        self.send(Command::Write(payloads)).await
    }

    /// Install the callback invoked once per received payload.
    pub async fn on_read(
        &self,
        callback: impl FnMut(Vec<u8>) + Send + 'static,
    ) -> Result<(), Error> {
        self.send(Command::OnRead(Box::new(callback))).await
    }

    /// Install the callback invoked once per protocol failure.
    pub async fn on_error(
        &self,
        callback: impl FnMut(ProtocolError) + Send + 'static,
    ) -> Result<(), Error> {
        self.send(Command::OnError(Box::new(callback))).await
    }

    async fn send(&self, command: Command) -> Result<(), Error> {
        self.commands.send(command).await.map_err(|_| Error::Closed)
    }

    /// Stop the engine, cancel any armed timer and drop the queue.
    /// Idempotent; also runs on drop.
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Bisync {
    fn drop(&mut self) {
        self.close();
    }
}

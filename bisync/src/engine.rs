//! The protocol engine.
//!
//! One task owns every piece of link state: the state variable, the outbound
//! queue, the retry counter, the attached handler and its timer. A single
//! `select!` loop interleaves caller commands, inbound bytes and the armed
//! phase timer, and each event runs to completion before the next is taken,
//! so no state is ever observed mid-transition.

use std::collections::VecDeque;
use std::pin::Pin;

use regex::bytes::Regex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tracing::{debug, trace, warn};

use crate::config::LinkOptions;
use crate::error::ProtocolError;
use crate::frame::{Frame, FrameParser, InboundFrame, ACK, ENQ, EOT, NAK};
use crate::handler::Handler;

/// Callback invoked once per successfully received payload.
pub type ReadCallback = Box<dyn FnMut(Vec<u8>) + Send>;
/// Callback invoked once per protocol failure.
pub type ErrorCallback = Box<dyn FnMut(ProtocolError) + Send>;

/// Caller-side requests, serialized onto the engine task.
pub(crate) enum Command {
    /// Frame and enqueue these payloads; transmission starts at once when
    /// the link is idle.
    Write(Vec<Vec<u8>>),
    /// Replace the read callback.
    OnRead(ReadCallback),
    /// Replace the error callback.
    OnError(ErrorCallback),
}

/// Exchange state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// ENQ sent, transmission not yet granted.
    AboutToTx,
    /// Frame sent, awaiting confirmation.
    TxStarted,
    /// Frame confirmed, EOT on the way out.
    TxFinished,
    /// Peer granted, frame incoming.
    RxStarted,
    /// Frame confirmed to the peer, awaiting EOT.
    RxFinished,
}

/// The attached handler together with the timer armed for its phase.
/// Dropping the attachment disarms the timer, so a detached phase can never
/// fire late.
struct Attached {
    handler: Handler,
    expires: Pin<Box<Sleep>>,
}

/// Resolves when the attached handler's timer fires. The caller guards with
/// `is_some`, so the `None` arm only has to stay pending.
async fn expired(attached: &mut Option<Attached>) {
    match attached {
        Some(attached) => attached.expires.as_mut().await,
        None => std::future::pending().await,
    }
}

pub(crate) struct Engine {
    state: State,
    /// Pending frames in transmission order; the head is the frame currently
    /// being negotiated.
    queue: VecDeque<Frame>,
    retry: u8,
    attached: Option<Attached>,
    options: LinkOptions,
    frame_shape: Regex,
    commands: mpsc::Receiver<Command>,
    inbound: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    on_read: Option<ReadCallback>,
    on_error: Option<ErrorCallback>,
}

impl Engine {
    pub(crate) fn new(
        options: LinkOptions,
        commands: mpsc::Receiver<Command>,
        inbound: mpsc::Receiver<Vec<u8>>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            state: State::Idle,
            queue: VecDeque::new(),
            retry: 0,
            attached: None,
            options,
            frame_shape: FrameParser::shape(),
            commands,
            inbound,
            outbound,
            on_read: None,
            on_error: None,
        }
    }

    /// Drive the link until the caller or the transport goes away. Pending
    /// frames and the armed timer die with the task.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("caller gone, engine stopping");
                        break;
                    }
                },
                chunk = self.inbound.recv() => match chunk {
                    Some(chunk) => {
                        for byte in chunk {
                            self.on_byte(byte);
                        }
                    }
                    None => {
                        debug!("transport closed, engine stopping");
                        break;
                    }
                },
                () = expired(&mut self.attached), if self.attached.is_some() => {
                    self.on_timeout();
                }
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Write(payloads) => {
                for payload in payloads {
                    self.queue.push_back(Frame::new(payload));
                }
                if self.state == State::Idle && self.attached.is_none() {
                    self.next();
                }
            }
            Command::OnRead(callback) => self.on_read = Some(callback),
            Command::OnError(callback) => self.on_error = Some(callback),
        }
    }

    /// Inbound dispatcher: hand the byte to the attached handler, or
    /// recognize the unconditional control bytes while idle.
    fn on_byte(&mut self, byte: u8) {
        match self.attached.take() {
            Some(attached) => self.dispatch(attached, byte),
            None => self.on_idle_byte(byte),
        }
    }

    fn on_idle_byte(&mut self, byte: u8) {
        match byte {
            ENQ => self.on_enq(),
            NAK => {
                trace!("RX: NAK while idle");
                self.report(ProtocolError::PeerNotAcknowledge);
            }
            byte => {
                // Line noise between exchanges; nothing waits on it.
                trace!(byte, "RX: unexpected byte while idle");
            }
        }
    }

    fn dispatch(&mut self, mut attached: Attached, byte: u8) {
        match &mut attached.handler {
            Handler::EnqForAck => self.enq_for_ack_byte(attached, byte),
            Handler::MessageForAck => self.message_for_ack_byte(attached, byte),
            Handler::AckForMessage(parser) => {
                let completed = parser.push(byte);
                match completed {
                    Some(frame) => {
                        drop(attached);
                        self.on_inbound_frame(frame);
                    }
                    None => self.attached = Some(attached),
                }
            }
            Handler::AckForEot => self.ack_for_eot_byte(attached, byte),
        }
    }

    /// The armed phase timer fired: drive the attached handler's timeout
    /// transition.
    fn on_timeout(&mut self) {
        let Some(attached) = self.attached.take() else {
            return;
        };
        debug!(phase = attached.handler.kind(), "timeout");
        match attached.handler {
            Handler::EnqForAck => self.enq_timeout(),
            Handler::MessageForAck => self.give_up(ProtocolError::NoAckAfterMessage),
            Handler::AckForMessage(_) => {
                // The accumulated bytes were dropped with the handler.
                self.report(ProtocolError::NoMessageTooLong);
                self.enter_idle();
            }
            Handler::AckForEot => {
                self.report(ProtocolError::NoEotTooLong);
                self.enter_idle();
            }
        }
    }

    /// Begin negotiating the head of the queue, if any.
    fn next(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        self.retry = 0;
        self.send_enq();
    }

    /// Emit ENQ and wait for the grant.
    fn send_enq(&mut self) {
        trace!(attempt = self.retry, "TX: ENQ");
        self.set_state(State::AboutToTx);
        self.send(&[ENQ]);
        self.attach(Handler::EnqForAck);
    }

    /// Post-ENQ wait: ACK grants, ENQ is a collision, NAK refuses.
    fn enq_for_ack_byte(&mut self, attached: Attached, byte: u8) {
        match byte {
            ACK => {
                trace!("RX: ACK");
                drop(attached);
                self.retry = 0;
                self.transmit_frame();
            }
            ENQ => {
                trace!("RX: ENQ, collision");
                drop(attached);
                self.report(ProtocolError::CollisionDetected);
                // Stay quiet instead of re-enqueueing: the peer's retried
                // ENQ is granted from idle, and our head goes out once that
                // exchange completes.
                self.retry = 0;
                self.set_state(State::Idle);
            }
            NAK => {
                trace!("RX: NAK");
                drop(attached);
                self.give_up(ProtocolError::PeerNotAcknowledge);
            }
            byte => {
                trace!(byte, "RX: ignored while waiting for the grant");
                self.attached = Some(attached);
            }
        }
    }

    /// Unanswered ENQ: walk the retry schedule, then give up.
    fn enq_timeout(&mut self) {
        if self.retry < self.options.timings.max_retry {
            self.retry += 1;
            self.report(ProtocolError::NoAckBeforeMessage {
                attempt: self.retry,
            });
            self.send_enq();
        } else {
            self.give_up(ProtocolError::RemotePeerNotResponding);
        }
    }

    /// Grant received: put the head frame on the wire and wait for its ACK.
    fn transmit_frame(&mut self) {
        let Some(frame) = self.queue.front() else {
            warn!("ACK for ENQ but the queue is empty");
            self.set_state(State::Idle);
            return;
        };
        debug!(len = frame.payload().len(), "TX: MESSAGE");
        let bytes = frame.encode();
        self.set_state(State::TxStarted);
        self.send(&bytes);
        self.attach(Handler::MessageForAck);
    }

    /// Post-frame wait: ACK confirms, NAK rejects.
    fn message_for_ack_byte(&mut self, attached: Attached, byte: u8) {
        match byte {
            ACK => {
                trace!("RX: ACK");
                drop(attached);
                self.set_state(State::TxFinished);
                self.send_eot();
            }
            NAK => {
                trace!("RX: NAK");
                drop(attached);
                self.give_up(ProtocolError::PeerNotAcknowledge);
            }
            byte => {
                trace!(byte, "RX: ignored while waiting for confirmation");
                self.attached = Some(attached);
            }
        }
    }

    /// Confirmation received: close the exchange and start the next one.
    fn send_eot(&mut self) {
        trace!("TX: EOT");
        self.send(&[EOT]);
        self.queue.pop_front();
        self.retry = 0;
        self.enter_idle();
    }

    /// Grant the peer's ENQ and wait for the framed message.
    fn on_enq(&mut self) {
        trace!("RX: ENQ");
        self.set_state(State::RxStarted);
        trace!("TX: ACK");
        self.send(&[ACK]);
        self.attach(Handler::AckForMessage(FrameParser::new(
            self.frame_shape.clone(),
        )));
    }

    /// A complete frame arrived while receiving: validate, deliver, confirm.
    fn on_inbound_frame(&mut self, frame: InboundFrame) {
        if !frame.checksum_ok() {
            if !self.options.ignore_checksum_errors {
                self.report(ProtocolError::ChecksumError {
                    expected: frame.computed_bcc,
                    received: frame.received_bcc,
                });
                trace!("TX: NAK");
                self.send(&[NAK]);
                self.enter_idle();
                return;
            }
            // Tolerated on noisy lines; the payload is delivered anyway.
            warn!(
                expected = frame.computed_bcc,
                received = frame.received_bcc,
                "checksum mismatch ignored"
            );
        }
        debug!(len = frame.payload.len(), "RX: MESSAGE");
        if let Some(callback) = self.on_read.as_mut() {
            callback(frame.payload);
        }
        self.set_state(State::RxFinished);
        trace!("TX: ACK");
        self.send(&[ACK]);
        self.attach(Handler::AckForEot);
    }

    /// Post-confirmation wait: EOT closes the peer's exchange.
    fn ack_for_eot_byte(&mut self, attached: Attached, byte: u8) {
        match byte {
            EOT => {
                trace!("RX: EOT");
                drop(attached);
                self.enter_idle();
            }
            byte => {
                trace!(byte, "RX: ignored while waiting for EOT");
                self.attached = Some(attached);
            }
        }
    }

    /// Definitive failure of the head frame: report, drop it, move on.
    fn give_up(&mut self, error: ProtocolError) {
        self.report(error);
        self.queue.pop_front();
        self.retry = 0;
        self.enter_idle();
    }

    /// Return to idle and immediately start the next queued exchange.
    fn enter_idle(&mut self) {
        self.set_state(State::Idle);
        self.next();
    }

    /// Attach `handler` as the sole recipient of inbound bytes and arm its
    /// phase timer. A previous attachment, timer included, is dropped first.
    fn attach(&mut self, handler: Handler) {
        let interval = handler.interval(&self.options.timings, self.retry);
        trace!(phase = handler.kind(), ?interval, "attach");
        self.attached = Some(Attached {
            handler,
            expires: Box::pin(sleep(interval)),
        });
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            trace!(from = ?self.state, to = ?state, "state");
            self.state = state;
        }
    }

    /// Queue bytes for the writer task. A closed transport means the link
    /// is shutting down; the bytes have nowhere to go.
    fn send(&mut self, bytes: &[u8]) {
        if self.outbound.send(bytes.to_vec()).is_err() {
            warn!("transport gone, dropping outbound bytes");
        }
    }

    /// Surface one protocol failure to the caller.
    fn report(&mut self, error: ProtocolError) {
        warn!(code = error.code(), "{error}");
        if let Some(callback) = self.on_error.as_mut() {
            callback(error);
        }
    }
}

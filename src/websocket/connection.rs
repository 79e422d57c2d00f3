//! `WebSocketConnection`: the per-connection state machine, handle and
//! message-handler contract.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use mio::net::TcpStream as MioTcpStream;
use uuid::Uuid;

use crate::websocket::frame::{self, FrameDecoder, Opcode};

/// Status codes named in the wire protocol (RFC 6455 §7.4.1).
pub const NORMAL: u16 = 1000;
pub const GOING_AWAY: u16 = 1001;
pub const PROTOCOL_ERROR: u16 = 1002;
pub const UNACCEPTABLE_DATA: u16 = 1003;
pub const NO_CODE: u16 = 1005;
pub const CLOSED_ABNORMALLY: u16 = 1006;
pub const INCONSISTENT_DATA: u16 = 1007;
pub const POLICY_VIOLATION: u16 = 1008;
pub const MESSAGE_TOO_BIG: u16 = 1009;
pub const EXTENSION_NEGOTIATION_FAILURE: u16 = 1010;
pub const UNEXPECTED_CONDITION: u16 = 1011;
pub const TLS_HANDSHAKE_FAILURE: u16 = 1015;

/// The message-handler contract a host application implements to react
/// to WebSocket traffic.
pub trait MessageHandler: Send + Sync {
    fn on_text(&self, connection: &ConnectionHandle, text: String);
    fn on_binary(&self, connection: &ConnectionHandle, data: Vec<u8>);
    fn on_close(&self, connection_id: Uuid, status: u16, message: Vec<u8>);
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
enum State {
    Live = 0,
    HalfClosedReceiving = 1,
    Closed = 2,
}

impl State {
    fn from_u8(value: u8) -> State {
        match value {
            0 => State::Live,
            1 => State::HalfClosedReceiving,
            _ => State::Closed,
        }
    }
}

struct ContinuationSlot {
    opcode: Opcode,
    payload: Vec<u8>,
}

/// One upgraded WebSocket connection: its id, the non-blocking socket,
/// and the per-connection continuation-frame slot.
pub struct ConnectionHandle {
    pub id: Uuid,
    socket: Mutex<MioTcpStream>,
    state: AtomicU8,
    /// Set alongside `state` transitioning to `Closed` exactly when the
    /// handler has already been notified (the CLOSE-frame dispatch
    /// path notifies inline, with the real status/message). Sockets
    /// that die without a close handshake are marked closed but not
    /// notified here, so the registry's prune step notifies them with
    /// `CLOSED_ABNORMALLY` on the next loop iteration.
    notified: AtomicU8,
    continuation: Mutex<Option<ContinuationSlot>>,
    /// Bytes already pulled off the socket but not yet enough to form a
    /// complete frame, kept here (rather than in a local on each poll
    /// event) so a `WouldBlock` mid-frame never drops them.
    decoder: Mutex<FrameDecoder>,
}

impl ConnectionHandle {
    pub fn new(id: Uuid, socket: MioTcpStream) -> ConnectionHandle {
        ConnectionHandle {
            id,
            socket: Mutex::new(socket),
            state: AtomicU8::new(State::Live as u8),
            notified: AtomicU8::new(0),
            continuation: Mutex::new(None),
            decoder: Mutex::new(FrameDecoder::new()),
        }
    }

    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// True if this connection is closed but the registry has not yet
    /// delivered `on_close` for it (an abnormal death, not a CLOSE
    /// handshake).
    pub fn needs_close_notification(&self) -> bool {
        self.is_closed() && self.notified.load(Ordering::SeqCst) == 0
    }

    pub fn mark_notified(&self) {
        self.notified.store(1, Ordering::SeqCst);
    }

    /// Writes a single unmasked data frame. Errors are the caller's to
    /// interpret (broadcast callers swallow them with a warning).
    pub fn send_text(&self, text: &str) -> std::io::Result<()> {
        let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        frame::write_frame(&mut *socket, true, Opcode::Text, text.as_bytes())
    }

    pub fn send_binary(&self, data: &[u8]) -> std::io::Result<()> {
        let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        frame::write_frame(&mut *socket, true, Opcode::Binary, data)
    }

    /// Writes a close frame (status as a 2-byte big-endian prefix
    /// followed by up to 123 bytes of message) and transitions to
    /// `HALF-CLOSED-RECEIVING`, awaiting the peer's own CLOSE frame.
    pub fn send_close(&self, status: u16, message: &[u8]) -> std::io::Result<()> {
        let mut payload = Vec::with_capacity(2 + message.len().min(123));
        payload.extend_from_slice(&status.to_be_bytes());
        payload.extend_from_slice(&message[..message.len().min(123)]);

        let result = {
            let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
            frame::write_frame(&mut *socket, true, Opcode::Close, &payload)
        };
        self.state.store(State::HalfClosedReceiving as u8, Ordering::SeqCst);
        result
    }

    fn echo_close(&self, payload: &[u8]) {
        let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        let _ = frame::write_frame(&mut *socket, true, Opcode::Close, payload);
    }

    fn shutdown_socket(&self) {
        let socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        let _ = socket.shutdown(std::net::Shutdown::Both);
    }

    pub fn mark_closed(&self) {
        self.state.store(State::Closed as u8, Ordering::SeqCst);
    }

    pub(crate) fn with_socket<R>(&self, f: impl FnOnce(&mut MioTcpStream) -> R) -> R {
        let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut socket)
    }

    /// Performs one non-blocking read into the connection's frame
    /// buffer. See `FrameDecoder::fill_once` for the return contract.
    pub(crate) fn fill_frame_buffer(&self) -> std::io::Result<bool> {
        let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        let mut decoder = self.decoder.lock().unwrap_or_else(|e| e.into_inner());
        decoder.fill_once(&mut *socket)
    }

    /// Pulls the next frame that is now fully buffered, if any.
    pub(crate) fn next_buffered_frame(&self) -> Result<Option<frame::Frame>, frame::FrameError> {
        self.decoder.lock().unwrap_or_else(|e| e.into_inner()).try_parse()
    }

    /// Dispatches one decoded frame per the rules in the specification:
    /// data frames deliver or buffer depending on FIN, PING replies
    /// with PONG, CLOSE echoes and transitions to `CLOSED`.
    pub(crate) fn dispatch(&self, frame: frame::Frame, handler: &dyn MessageHandler) {
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                if frame.fin {
                    self.deliver(frame.opcode, frame.payload, handler);
                } else {
                    *self.continuation.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(ContinuationSlot { opcode: frame.opcode, payload: frame.payload });
                }
            }
            Opcode::Continuation => {
                let mut slot = self.continuation.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(pending) = slot.as_mut() {
                    pending.payload.extend_from_slice(&frame.payload);
                    if frame.fin {
                        let ContinuationSlot { opcode, payload } = slot.take().unwrap();
                        drop(slot);
                        self.deliver(opcode, payload, handler);
                    }
                }
                // No slot: silently ignore, per spec.
            }
            Opcode::Ping => {
                let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
                let _ = frame::write_frame(&mut *socket, true, Opcode::Pong, &frame.payload);
            }
            Opcode::Pong => {}
            Opcode::Close => {
                let (status, message) = if frame.payload.len() >= 2 {
                    let status = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
                    (status, frame.payload[2..].to_vec())
                } else {
                    (NO_CODE, Vec::new())
                };
                self.echo_close(&frame.payload);
                self.shutdown_socket();
                self.mark_closed();
                self.mark_notified();
                handler.on_close(self.id, status, message);
            }
        }
    }

    fn deliver(&self, opcode: Opcode, payload: Vec<u8>, handler: &dyn MessageHandler) {
        match opcode {
            Opcode::Text => handler.on_text(self, String::from_utf8_lossy(&payload).into_owned()),
            Opcode::Binary => handler.on_binary(self, payload),
            _ => unreachable!("only TEXT/BINARY are ever buffered for continuation"),
        }
    }
}

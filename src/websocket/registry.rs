//! The WebSocket registry and event loop (C8): a UUID → connection map
//! guarded by a readers-writer lock, driven by an `mio::Poll` reactor
//! polling with a 100 ms timeout.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{error, warn};
use mio::net::TcpStream as MioTcpStream;
use mio::{Events, Interest, Poll, Token};
use uuid::Uuid;

use crate::websocket::connection::{ConnectionHandle, MessageHandler, CLOSED_ABNORMALLY};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const EMPTY_SET_SLEEP: Duration = Duration::from_millis(1);

/// Owns every upgraded connection and the reactor driving them.
pub struct Registry {
    connections: RwLock<HashMap<Uuid, Arc<ConnectionHandle>>>,
    tokens: RwLock<HashMap<Token, Uuid>>,
    poll: std::sync::Mutex<Poll>,
    next_token: AtomicUsize,
}

impl Registry {
    pub fn new() -> std::io::Result<Registry> {
        Ok(Registry {
            connections: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            poll: std::sync::Mutex::new(Poll::new()?),
            next_token: AtomicUsize::new(0),
        })
    }

    /// Hands a just-upgraded, still-open socket to the registry: wraps
    /// it as non-blocking, registers it for readability, and assigns it
    /// a fresh UUID.
    pub fn register(&self, socket: TcpStream) -> std::io::Result<Uuid> {
        socket.set_nonblocking(true)?;
        let mut mio_socket = MioTcpStream::from_std(socket);
        let token = Token(self.next_token.fetch_add(1, Ordering::SeqCst));

        self.poll
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .registry()
            .register(&mut mio_socket, token, Interest::READABLE)?;

        let id = Uuid::new_v4();
        let handle = Arc::new(ConnectionHandle::new(id, mio_socket));

        self.connections.write().unwrap_or_else(|e| e.into_inner()).insert(id, handle);
        self.tokens.write().unwrap_or_else(|e| e.into_inner()).insert(token, id);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }

    /// Iterates every live connection under the read lock, swallowing
    /// per-connection send failures with a warning.
    pub fn broadcast_text(&self, text: &str) {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        for handle in connections.values() {
            if let Err(err) = handle.send_text(text) {
                warn!("broadcast to {} failed: {}", handle.id, err);
            }
        }
    }

    pub fn broadcast_binary(&self, data: &[u8]) {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        for handle in connections.values() {
            if let Err(err) = handle.send_binary(data) {
                warn!("broadcast to {} failed: {}", handle.id, err);
            }
        }
    }

    /// One iteration of the event loop: prune dead connections, poll,
    /// then read and dispatch one frame per readable connection.
    fn run_once(&self, handler: &dyn MessageHandler) {
        self.prune_and_notify(handler);

        let snapshot: Vec<(Token, Arc<ConnectionHandle>)> = {
            let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
            let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
            tokens
                .iter()
                .filter_map(|(token, id)| connections.get(id).map(|handle| (*token, Arc::clone(handle))))
                .collect()
        };

        if snapshot.is_empty() {
            std::thread::sleep(EMPTY_SET_SLEEP);
            return;
        }

        let mut events = Events::with_capacity(snapshot.len().max(16));
        {
            let mut poll = self.poll.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() != ErrorKind::Interrupted {
                    error!("WebSocket poll failed: {}", err);
                }
                return;
            }
        }

        for event in events.iter() {
            let handle = snapshot.iter().find(|(token, _)| *token == event.token()).map(|(_, h)| h);
            let handle = match handle {
                Some(h) => h,
                None => continue,
            };
            if !event.is_readable() {
                continue;
            }
            self.read_and_dispatch_ready(handle, handler);
        }
    }

    /// Pulls whatever is currently available off the socket into the
    /// connection's own frame buffer, then dispatches every frame that
    /// buffer now fully contains. Bytes that don't yet complete a frame
    /// stay buffered on the connection across calls, so they survive a
    /// `WouldBlock` instead of being discarded and desyncing the frame
    /// boundary on the next readiness event.
    fn read_and_dispatch_ready(&self, handle: &Arc<ConnectionHandle>, handler: &dyn MessageHandler) {
        match handle.fill_frame_buffer() {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => {
                warn!("WebSocket connection {} failed: {}", handle.id, err);
                self.abort(handle);
                return;
            }
        }

        loop {
            match handle.next_buffered_frame() {
                Ok(Some(frame)) => handle.dispatch(frame, handler),
                Ok(None) => break,
                Err(err) => {
                    warn!("WebSocket protocol error on {}: {}", handle.id, err);
                    self.abort(handle);
                    break;
                }
            }
        }
    }

    fn abort(&self, handle: &Arc<ConnectionHandle>) {
        handle.with_socket(|socket| {
            let _ = socket.shutdown(std::net::Shutdown::Both);
        });
        handle.mark_closed();
    }

    fn prune_and_notify(&self, handler: &dyn MessageHandler) {
        let dead: Vec<Uuid> = {
            let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
            connections
                .values()
                .filter(|handle| handle.is_closed())
                .map(|handle| handle.id)
                .collect()
        };

        for id in dead {
            if let Some(handle) = self.get(id) {
                if handle.needs_close_notification() {
                    handle.mark_notified();
                    handler.on_close(id, CLOSED_ABNORMALLY, Vec::new());
                }
            }
            self.connections.write().unwrap_or_else(|e| e.into_inner()).remove(&id);
            self.tokens.write().unwrap_or_else(|e| e.into_inner()).retain(|_, v| *v != id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Runs the registry's event loop on the calling thread until
/// `running` is observed false.
pub fn run(registry: Arc<Registry>, handler: Arc<dyn MessageHandler>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        registry.run_once(handler.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    struct RecordingHandler {
        texts: std::sync::Mutex<Vec<String>>,
    }

    impl MessageHandler for RecordingHandler {
        fn on_text(&self, _connection: &ConnectionHandle, text: String) {
            self.texts.lock().unwrap().push(text);
        }
        fn on_binary(&self, _connection: &ConnectionHandle, _data: Vec<u8>) {}
        fn on_close(&self, _connection_id: Uuid, _status: u16, _message: Vec<u8>) {}
    }

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (server_side, client)
    }

    #[test]
    fn registers_connection_and_dispatches_text_frame() {
        let (server_side, mut client) = connected_pair();
        let registry = Registry::new().unwrap();
        let id = registry.register(server_side).unwrap();
        assert_eq!(registry.connection_count(), 1);

        let mut frame = vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        client.write_all(&mut frame).unwrap();

        let handler = Arc::new(RecordingHandler { texts: std::sync::Mutex::new(Vec::new()) });

        let mut attempts = 0;
        while handler.texts.lock().unwrap().is_empty() && attempts < 50 {
            registry.run_once(handler.as_ref());
            attempts += 1;
        }

        assert_eq!(*handler.texts.lock().unwrap(), vec!["Hello".to_string()]);
        let _ = client.read(&mut [0u8; 1]);
        let _ = id;
    }
}

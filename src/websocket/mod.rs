//! The WebSocket subsystem (C8): upgrade handshake, frame codec,
//! connection registry and event loop.

pub mod connection;
pub mod frame;
pub mod handshake;
pub mod registry;

use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use uuid::Uuid;

pub use connection::{ConnectionHandle, MessageHandler};
pub use handshake::HandshakeError;
pub use registry::Registry;

use crate::http::{Request, Response};

/// Owns the registry and the manager thread driving its event loop.
/// Started by the server facade (C7) only when `enable_websockets` is
/// set.
pub struct WebSocketManager {
    registry: Arc<Registry>,
    running: Arc<AtomicBool>,
    loop_thread: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl WebSocketManager {
    /// Starts the registry's event-loop thread. Construct this before
    /// the handler that will call `accept_upgrade` so the handler can
    /// hold a reference to it (typically via `Arc<WebSocketManager>`);
    /// the server facade only owns its lifecycle, not its creation.
    pub fn start(handler: Arc<dyn MessageHandler>) -> std::io::Result<WebSocketManager> {
        let registry = Arc::new(Registry::new()?);
        let running = Arc::new(AtomicBool::new(true));

        let loop_thread = {
            let registry = Arc::clone(&registry);
            let running = Arc::clone(&running);
            std::thread::spawn(move || registry::run(registry, handler, running))
        };

        Ok(WebSocketManager { registry, running, loop_thread: std::sync::Mutex::new(Some(loop_thread)) })
    }

    /// Validates and completes the upgrade handshake, then hands the
    /// still-open socket to the registry. Call only after the worker
    /// has confirmed `response.status() == 101`.
    pub fn accept_upgrade(&self, request: &Request, response: &mut Response<TcpStream>) -> Result<Uuid, HandshakeError> {
        handshake::upgrade(request, response)?;
        let _ = response.flush();
        let socket = response_socket(response);
        self.registry.register(socket).map_err(HandshakeError::from)
    }

    pub fn broadcast_text(&self, text: &str) {
        self.registry.broadcast_text(text);
    }

    pub fn broadcast_binary(&self, data: &[u8]) {
        self.registry.broadcast_binary(data);
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.registry.get(id)
    }

    /// Stops the event-loop thread and joins it. Idempotent: calling
    /// this more than once (e.g. once from the server facade and once
    /// from application shutdown code sharing the same `Arc`) is safe.
    pub fn stop(&self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(thread) = self.loop_thread.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = thread.join();
        }
    }
}

/// Extracts the socket out of a response that has just completed a
/// successful upgrade. Only valid immediately after `accept_upgrade`'s
/// internal `handshake::upgrade` call, before the worker would
/// otherwise have closed it.
fn response_socket(response: &mut Response<TcpStream>) -> TcpStream {
    response
        .take_socket()
        .expect("response socket must still be present immediately after upgrade")
}

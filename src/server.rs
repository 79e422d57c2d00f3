//! Accept loop + server facade (C7): `Config`/`ConfigBuilder` and the
//! `Server` that owns the listening socket, the worker pool and,
//! optionally, the WebSocket manager.

use std::io;
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use socket2::{Domain, Socket, Type};

use crate::error::Error;
use crate::multimap::MultiMap;
use crate::pool::WorkerPool;
use crate::websocket::WebSocketManager;
use crate::worker::RequestHandler;

type PreBindCallback = Box<dyn Fn(&TcpListener) + Send + Sync>;
type PostShutdownCallback = Box<dyn Fn() + Send + Sync>;

/// How often the accept loop re-checks `running` while no connection is
/// pending. A cloned listener fd staying open elsewhere means closing
/// it alone can't interrupt a blocked `accept()`, so the loop polls a
/// non-blocking listener instead (the same shape as the worker queue's
/// timed dequeue and the WebSocket registry's poll loop).
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Server configuration. Every field matches the specified option
/// table and default; immutable once `Server::start` takes ownership.
/// `reuse_address` sets `SO_REUSEADDR` and `connection_queue_size` sets
/// the `listen` backlog, both via `socket2` (`std::net::TcpListener`
/// exposes neither on its own `bind`); see `bind_listener` below.
pub struct Config {
    pub hostname: String,
    pub port: u16,
    pub reuse_address: bool,
    pub connection_queue_size: i32,
    pub receive_buffer_size: usize,
    pub request_queue_size: usize,
    pub worker_pool_size: usize,
    pub worker_pool_manager_interval_ms: u64,
    pub default_headers: MultiMap<String, String>,
    pub pre_bind_callbacks: Vec<PreBindCallback>,
    pub post_shutdown_callbacks: Vec<PostShutdownCallback>,
    pub enable_websockets: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            hostname: "127.0.0.1".to_string(),
            port: 8080,
            reuse_address: true,
            connection_queue_size: 100,
            receive_buffer_size: 8192,
            request_queue_size: 128,
            worker_pool_size: 25,
            worker_pool_manager_interval_ms: 60_000,
            default_headers: MultiMap::new(),
            pre_bind_callbacks: Vec::new(),
            post_shutdown_callbacks: Vec::new(),
            enable_websockets: false,
        }
    }
}

/// Incrementally builds a `Config`, mirroring the teacher's own
/// `Server` construction style.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> ConfigBuilder {
        ConfigBuilder { config: Config::default() }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn reuse_address(mut self, reuse: bool) -> Self {
        self.config.reuse_address = reuse;
        self
    }

    pub fn connection_queue_size(mut self, size: i32) -> Self {
        self.config.connection_queue_size = size;
        self
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.config.receive_buffer_size = size;
        self
    }

    pub fn request_queue_size(mut self, size: usize) -> Self {
        self.config.request_queue_size = size;
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    pub fn worker_pool_manager_interval_ms(mut self, interval: u64) -> Self {
        self.config.worker_pool_manager_interval_ms = interval;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn pre_bind_callback(mut self, callback: impl Fn(&TcpListener) + Send + Sync + 'static) -> Self {
        self.config.pre_bind_callbacks.push(Box::new(callback));
        self
    }

    pub fn post_shutdown_callback(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.config.post_shutdown_callbacks.push(Box::new(callback));
        self
    }

    pub fn enable_websockets(mut self, enabled: bool) -> Self {
        self.config.enable_websockets = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Builds the listening socket through `socket2` so `reuse_address` and
/// `connection_queue_size` actually take effect, then hands it back as
/// a plain `std::net::TcpListener` for the rest of the accept loop.
fn bind_listener(config: &Config) -> io::Result<TcpListener> {
    let addr = (config.hostname.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no socket address resolved"))?;

    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(config.reuse_address)?;
    socket.bind(&addr.into())?;
    let backlog = if config.connection_queue_size > 0 { config.connection_queue_size } else { 128 };
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// The server facade: owns the listening socket's lifecycle and the
/// worker pool / WebSocket manager it starts.
pub struct Server {
    ready: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn new() -> Server {
        Server {
            ready: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Signals the accept loop to exit. Callable from any thread; the
    /// loop notices within one `ACCEPT_POLL_INTERVAL`.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Runs the seven-step accept loop on the calling thread until
    /// `stop()` is called or the listener otherwise dies. `handler`
    /// serves ordinary HTTP requests. `websocket_manager` must already
    /// be running (via `WebSocketManager::start`) whenever
    /// `config.enable_websockets` is set, since `handler` itself needs
    /// a handle to it (to call `accept_upgrade`) before the server can
    /// exist to hand one back. The facade only owns its shutdown, not
    /// its construction.
    pub fn start(
        &self,
        config: Config,
        handler: Arc<dyn RequestHandler>,
        websocket_manager: Option<Arc<WebSocketManager>>,
    ) -> Result<(), Error> {
        if config.request_queue_size == 0 {
            return Err(Error::Config("request_queue_size must be non-zero".to_string()));
        }
        if config.worker_pool_size == 0 {
            return Err(Error::Config("worker_pool_size must be non-zero".to_string()));
        }

        let listener = bind_listener(&config).map_err(Error::Bind)?;

        for callback in &config.pre_bind_callbacks {
            callback(&listener);
        }

        listener.set_nonblocking(true).map_err(Error::Bind)?;

        self.ready.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let pool = WorkerPool::start(
            config.worker_pool_size,
            config.request_queue_size,
            Duration::from_millis(config.worker_pool_manager_interval_ms),
            handler,
            config.default_headers,
            config.receive_buffer_size,
        );

        if config.enable_websockets && websocket_manager.is_none() {
            pool.stop();
            return Err(Error::Config("enable_websockets requires an already-started WebSocketManager".to_string()));
        }

        self.accept_loop(&listener, &pool);

        self.ready.store(false, Ordering::SeqCst);
        pool.stop();
        if let Some(manager) = websocket_manager {
            manager.stop();
        }
        for callback in &config.post_shutdown_callbacks {
            callback();
        }

        Ok(())
    }

    fn accept_loop(&self, listener: &TcpListener, pool: &WorkerPool) {
        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((socket, _addr)) => {
                    if let Err(err) = socket.set_nonblocking(false) {
                        warn!("failed to restore blocking mode on accepted socket: {}", err);
                        continue;
                    }
                    pool.submit(socket);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    warn!("transient accept error: {}", err);
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        info!("accept loop exiting");
    }
}

impl Default for Server {
    fn default() -> Server {
        Server::new()
    }
}

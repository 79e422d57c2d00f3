//! Worker (C5): owns a fixed receive buffer and handles one accepted
//! socket at a time, pulled from the shared queue.

use std::io::Write;
use std::net::TcpStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, warn};

use crate::assembler::{self, AssembleError};
use crate::error::{HandlerError, StatusError};
use crate::multimap::MultiMap;
use crate::pool::queue::SocketQueue;
use crate::status::StatusCode;

const SWITCHING_PROTOCOLS: u16 = 101;

/// The identity and join handle of one pool worker, as seen by the
/// health manager. `is_running` reflects the underlying thread's own
/// liveness, so a worker that panics out of its loop (a bug, since
/// `process_one` catches handler panics itself) is detected exactly
/// like one that exited normally.
pub struct WorkerHandle {
    pub id: u64,
    busy: Arc<AtomicBool>,
    join: std::thread::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// True while this worker is between `dequeue` and finishing a
    /// response; false while blocked waiting for work.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn join(self) {
        let _ = self.join.join();
    }
}

/// A socket handler invoked by the worker for each assembled request.
/// Returning `Err` lets a handler signal failure instead of writing its
/// own error response: a `StatusError` sets the named status and writes
/// its message as the body, anything else becomes a `500`.
pub trait RequestHandler: Send + Sync {
    fn handle(
        &self,
        request: &mut crate::http::Request,
        response: &mut crate::http::Response<TcpStream>,
    ) -> Result<(), HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&mut crate::http::Request, &mut crate::http::Response<TcpStream>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        request: &mut crate::http::Request,
        response: &mut crate::http::Response<TcpStream>,
    ) -> Result<(), HandlerError> {
        (self)(request, response)
    }
}

/// Spawns one worker thread. It loops: dequeue, assemble, dispatch,
/// finish, until `pool_running` is observed false.
pub fn spawn(
    id: u64,
    queue: Arc<SocketQueue>,
    handler: Arc<dyn RequestHandler>,
    default_headers: Arc<MultiMap<String, String>>,
    receive_buffer_size: usize,
    pool_running: Arc<AtomicBool>,
) -> WorkerHandle {
    let busy = Arc::new(AtomicBool::new(false));
    let thread_busy = Arc::clone(&busy);

    let join = std::thread::spawn(move || {
        let mut buffer = vec![0u8; receive_buffer_size];

        while pool_running.load(Ordering::SeqCst) {
            let socket = match queue.dequeue() {
                Some(socket) => socket,
                None => continue,
            };
            thread_busy.store(true, Ordering::SeqCst);
            process_one(socket, &mut buffer, handler.as_ref(), default_headers.as_ref());
            thread_busy.store(false, Ordering::SeqCst);
        }
    });

    WorkerHandle { id, busy, join }
}

fn process_one(
    socket: TcpStream,
    buffer: &mut [u8],
    handler: &dyn RequestHandler,
    default_headers: &MultiMap<String, String>,
) {
    let (mut request, mut response) = match assembler::assemble(socket, buffer, default_headers) {
        Ok(pair) => pair,
        Err(AssembleError::ReadFailed) => return,
        Err(AssembleError::Parse(_)) => return,
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&mut request, &mut response)));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => handle_error(&mut response, err.as_ref()),
        Err(payload) => {
            if response.is_flushed() {
                error!("handler panicked after response was flushed: {:?}", panic_message(&payload));
            } else {
                error!("handler panicked before response was flushed: {:?}", panic_message(&payload));
                response.set_status(StatusCode::new(500));
                let _ = response.write_body_string("Internal Server Error", None);
            }
        }
    }

    if !response.is_flushed() {
        if let Err(err) = response.flush_headers() {
            warn!("failed to flush response headers: {}", err);
            return;
        }
    }

    let _ = response.finish();

    if response.status().code() == SWITCHING_PROTOCOLS {
        // Ownership of the socket has been transferred (to the
        // WebSocket registry); the worker must not touch it again.
        return;
    }

    if let Ok(mut socket) = response_into_socket(response) {
        let _ = socket.flush();
        let _ = socket.shutdown(std::net::Shutdown::Both);
    }
}

/// Applies a handler's returned error to the response: a `StatusError`
/// sets its named status and writes its message (or reason phrase) as
/// the body, anything else becomes a `500`. A no-op once the response
/// is already flushed, since the handler chose to write its own body
/// before returning `Err`.
fn handle_error(response: &mut crate::http::Response<TcpStream>, err: &(dyn std::error::Error + Send + 'static)) {
    if response.is_flushed() {
        error!("handler returned an error after response was flushed: {}", err);
        return;
    }

    match err.downcast_ref::<StatusError>() {
        Some(status_err) => {
            warn!("handler returned a status error: {}", status_err);
            response.set_status(status_err.code);
            let message = status_err.message.as_deref().unwrap_or_else(|| status_err.code.reason_phrase());
            let _ = response.write_body_string(message, None);
        }
        None => {
            error!("handler returned an error before response was flushed: {}", err);
            response.set_status(StatusCode::new(500));
            let _ = response.write_body_string("Internal Server Error", None);
        }
    }
}

fn response_into_socket(response: crate::http::Response<TcpStream>) -> std::io::Result<TcpStream> {
    response.into_inner()
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn worker_handles_one_request_then_closes_socket() {
        let queue = Arc::new(SocketQueue::new(4));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let accepted = Arc::new(Mutex::new(Vec::new()));
        let accepted_clone = Arc::clone(&accepted);
        let accept_thread = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            accepted_clone.lock().unwrap().push(());
            socket
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();

        let server_socket = accept_thread.join().unwrap();
        queue.enqueue(server_socket);

        let pool_running = Arc::new(AtomicBool::new(true));
        let hits = Arc::new(AtomicU64::new(0));
        let hits_clone = Arc::clone(&hits);
        let handler: Arc<dyn RequestHandler> = Arc::new(move |_req: &mut crate::http::Request, resp: &mut crate::http::Response<TcpStream>| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            resp.write_body_string("hi", None).unwrap();
            Ok(())
        });

        let worker = spawn(0, Arc::clone(&queue), handler, Arc::new(MultiMap::new()), 512, Arc::clone(&pool_running));

        let mut response_bytes = Vec::new();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let _ = client.read_to_end(&mut response_bytes);

        pool_running.store(false, Ordering::SeqCst);
        queue.wake_all();
        worker.join();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let text = String::from_utf8(response_bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hi"));
    }
}

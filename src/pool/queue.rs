//! The shared bounded accepted-socket queue (C6): a `Mutex` +
//! `Condvar`-guarded `VecDeque`, capacity `Q`. `enqueue` never blocks
//! the accept loop; `dequeue` waits up to 10 s.

use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(10);

/// A bounded FIFO of accepted sockets, shared between the accept loop
/// and every worker.
///
/// A `VecDeque` already behaves as an index-free ring buffer, the
/// idiomatic equivalent of shift-compacting a backing array once the
/// back index reaches capacity: neither representation ever holds more
/// than `capacity` items or reorders them.
pub struct SocketQueue {
    capacity: usize,
    state: Mutex<VecDeque<TcpStream>>,
    not_empty: Condvar,
}

impl SocketQueue {
    pub fn new(capacity: usize) -> SocketQueue {
        SocketQueue {
            capacity,
            state: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
        }
    }

    /// Appends `socket` to the back. Returns `false` (and drops the
    /// socket) if the queue is already at capacity; the caller is
    /// expected to log an error event and must not block.
    pub fn enqueue(&self, socket: TcpStream) -> bool {
        let mut queue = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(socket);
        self.not_empty.notify_one();
        true
    }

    /// Waits up to 10 s for an item, then pops from the front. Returns
    /// `None` on timeout, letting callers observe a stopped `running`
    /// flag.
    pub fn dequeue(&self) -> Option<TcpStream> {
        let queue = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (mut queue, timed_out) = self
            .not_empty
            .wait_timeout_while(queue, DEQUEUE_TIMEOUT, |q| q.is_empty())
            .unwrap_or_else(|e| e.into_inner());
        if timed_out.timed_out() {
            return None;
        }
        queue.pop_front()
    }

    /// Wakes every thread blocked in `dequeue` without handing them
    /// work, used during shutdown so workers observe the stopped
    /// `running` flag promptly instead of waiting out the full timeout.
    pub fn wake_all(&self) {
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

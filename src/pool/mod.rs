//! Worker pool + health manager (C6).

pub mod queue;

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, warn};

use crate::multimap::MultiMap;
use crate::worker::{self, RequestHandler, WorkerHandle};
use queue::SocketQueue;

/// Summary of worker liveness, logged by the health manager on every
/// interval tick.
#[derive(Debug, Eq, PartialEq)]
pub struct PoolHealth {
    pub busy: usize,
    pub waiting: usize,
    pub dead: usize,
}

/// Owns the shared socket queue, the worker list, and the manager
/// thread that periodically replaces dead workers.
pub struct WorkerPool {
    queue: Arc<SocketQueue>,
    workers: Arc<RwLock<Vec<WorkerHandle>>>,
    next_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    manager: Option<std::thread::JoinHandle<()>>,
    manager_wake: Arc<(std::sync::Mutex<()>, std::sync::Condvar)>,
}

impl WorkerPool {
    /// Starts `size` workers plus the manager thread. Workers begin
    /// pulling from `queue` immediately.
    pub fn start(
        size: usize,
        queue_capacity: usize,
        manager_interval: Duration,
        handler: Arc<dyn RequestHandler>,
        default_headers: MultiMap<String, String>,
        receive_buffer_size: usize,
    ) -> WorkerPool {
        let queue = Arc::new(SocketQueue::new(queue_capacity));
        let running = Arc::new(AtomicBool::new(true));
        let next_id = Arc::new(AtomicU64::new(0));
        let default_headers = Arc::new(default_headers);

        let initial_workers: Vec<WorkerHandle> = (0..size)
            .map(|_| {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                worker::spawn(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    Arc::clone(&default_headers),
                    receive_buffer_size,
                    Arc::clone(&running),
                )
            })
            .collect();

        let workers = Arc::new(RwLock::new(initial_workers));
        let manager_wake = Arc::new((std::sync::Mutex::new(()), std::sync::Condvar::new()));

        let manager = {
            let workers = Arc::clone(&workers);
            let queue = Arc::clone(&queue);
            let running = Arc::clone(&running);
            let next_id = Arc::clone(&next_id);
            let manager_wake = Arc::clone(&manager_wake);
            let handler = Arc::clone(&handler);
            let default_headers = Arc::clone(&default_headers);

            std::thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let (lock, condvar) = &*manager_wake;
                    let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                    let _ = condvar.wait_timeout(guard, manager_interval);

                    if !running.load(Ordering::SeqCst) {
                        break;
                    }

                    replace_dead_workers(
                        &workers,
                        &queue,
                        &next_id,
                        &running,
                        &handler,
                        &default_headers,
                        receive_buffer_size,
                    );
                    log_health_summary(&workers);
                }
            })
        };

        WorkerPool { queue, workers, next_id, running, manager: Some(manager), manager_wake }
    }

    /// Submits an accepted socket for handling. Never blocks the
    /// caller; drops the socket and returns `false` if the queue is
    /// full.
    pub fn submit(&self, socket: TcpStream) -> bool {
        let accepted = self.queue.enqueue(socket);
        if !accepted {
            error!("request queue full, dropping accepted connection");
        }
        accepted
    }

    pub fn health(&self) -> PoolHealth {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        let dead = workers.iter().filter(|w| !w.is_running()).count();
        let busy = workers.iter().filter(|w| w.is_running() && w.is_busy()).count();
        let waiting = workers.len() - dead - busy;
        PoolHealth { busy, waiting, dead }
    }

    /// Five-step shutdown: flip `running`, wake the manager, wake every
    /// worker, join the workers, join the manager.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.manager_wake.1.notify_all();
        self.queue.wake_all();
        self.queue.wake_all();

        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        for worker in workers.drain(..) {
            worker.join();
        }
        drop(workers);

        if let Some(manager) = self.manager.take() {
            let _ = manager.join();
        }

        self.next_id.store(0, Ordering::SeqCst);
    }
}

#[allow(clippy::too_many_arguments)]
fn replace_dead_workers(
    workers: &Arc<RwLock<Vec<WorkerHandle>>>,
    queue: &Arc<SocketQueue>,
    next_id: &Arc<AtomicU64>,
    running: &Arc<AtomicBool>,
    handler: &Arc<dyn RequestHandler>,
    default_headers: &Arc<MultiMap<String, String>>,
    receive_buffer_size: usize,
) {
    let mut workers = workers.write().unwrap_or_else(|e| e.into_inner());
    for slot in workers.iter_mut() {
        if !slot.is_running() {
            let dead_id = slot.id;
            let new_id = next_id.fetch_add(1, Ordering::SeqCst);
            let replacement = worker::spawn(
                new_id,
                Arc::clone(queue),
                Arc::clone(handler),
                Arc::clone(default_headers),
                receive_buffer_size,
                Arc::clone(running),
            );
            warn!("worker {} not running, replaced with worker {}", dead_id, new_id);
            *slot = replacement;
        }
    }
}

fn log_health_summary(workers: &Arc<RwLock<Vec<WorkerHandle>>>) {
    let workers = workers.read().unwrap_or_else(|e| e.into_inner());
    let dead = workers.iter().filter(|w| !w.is_running()).count();
    let busy = workers.iter().filter(|w| w.is_running() && w.is_busy()).count();
    let waiting = workers.len() - dead - busy;
    debug!("worker pool health: busy={} waiting={} dead={}", busy, waiting, dead);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn dummy_socket() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        client
    }

    #[test]
    fn pool_starts_requested_worker_count_and_submits_work() {
        let handler: Arc<dyn RequestHandler> =
            Arc::new(|_req: &mut crate::http::Request, _resp: &mut crate::http::Response<TcpStream>| Ok(()));
        let pool = WorkerPool::start(2, 8, Duration::from_secs(60), handler, MultiMap::new(), 512);
        assert_eq!(pool.health().waiting + pool.health().dead, 2);
        assert!(pool.submit(dummy_socket()));
        std::thread::sleep(Duration::from_millis(50));
        pool.stop();
    }

    #[test]
    fn health_manager_replaces_a_dead_worker_within_one_interval() {
        let handler: Arc<dyn RequestHandler> =
            Arc::new(|_req: &mut crate::http::Request, _resp: &mut crate::http::Response<TcpStream>| Ok(()));
        let pool = WorkerPool::start(
            3,
            8,
            Duration::from_millis(20),
            Arc::clone(&handler),
            MultiMap::new(),
            512,
        );

        // Simulate a worker that has already died by spawning one with
        // `pool_running` pre-set false: its loop body never runs, so
        // `is_running()` observes it as finished almost immediately.
        let dead = worker::spawn(
            9999,
            Arc::clone(&pool.queue),
            Arc::clone(&handler),
            Arc::new(MultiMap::new()),
            512,
            Arc::new(AtomicBool::new(false)),
        );
        while dead.is_running() {
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.workers.write().unwrap().push(dead);
        assert_eq!(pool.health().dead, 1);

        // One manager interval should be enough to notice and replace it.
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(pool.health().dead, 0);
        assert_eq!(pool.health().waiting + pool.health().busy, 4);

        pool.stop();
    }
}

//! Worker thread pool and its blocking work queue.
//!
//! The reactor thread turns readiness events into typed work items and pushes
//! them onto a [`WorkQueue`]; a fixed set of worker threads pop and execute
//! them for the lifetime of the process. Concurrency is bounded by the pool
//! size, and a slow handler stalls exactly one worker slot — there is no
//! preemption or timeout.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::debug;

/// A readiness event handed from the reactor to a worker.
///
/// Carries everything a handler needs — the connection token and the event
/// kind — so workers never reach into reactor-private state.
#[derive(Debug, Clone, Copy)]
pub struct WorkItem {
    /// Token of the descriptor the event fired for.
    pub token: usize,
    /// The descriptor is ready for reading (or accepting).
    pub readable: bool,
    /// The descriptor is ready for writing.
    pub writable: bool,
}

/// A blocking multi-producer/multi-consumer FIFO of work items.
///
/// `push` appends and wakes one waiting consumer; `pop` blocks until an item
/// is available. No fairness between waiting consumers is guaranteed.
pub struct WorkQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        WorkQueue { tx, rx }
    }

    /// Append an item, waking a waiting consumer if any.
    pub fn push(&self, item: T) {
        // Send fails only when every receiver is gone, which cannot happen
        // while the queue itself is alive.
        let _ = self.tx.send(item);
    }

    /// Block until an item is available and remove it.
    ///
    /// Returns `None` if the channel becomes disconnected.
    pub fn pop(&self) -> Option<T> {
        self.rx.recv().ok()
    }
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        WorkQueue {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed-size pool of worker threads consuming a [`WorkQueue`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` worker threads, each looping `pop -> handler(item)`.
    ///
    /// The pool runs for the process lifetime; there is no graceful
    /// shutdown.
    pub fn start<T, F>(count: usize, queue: WorkQueue<T>, handler: F) -> Self
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let mut handles = Vec::with_capacity(count);

        for i in 0..count {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let handle = thread::Builder::new()
                .name(format!("hearth-worker-{i}"))
                .spawn(move || {
                    while let Some(item) = queue.pop() {
                        handler(item);
                    }
                    debug!("worker exiting, queue closed");
                })
                .unwrap_or_else(|e| panic!("failed to spawn worker thread: {e}"));
            handles.push(handle);
        }

        WorkerPool { handles }
    }

    /// Number of worker threads in the pool.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn queue_is_fifo_for_a_single_consumer() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn pop_blocks_until_an_item_arrives() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        let consumer = queue.clone();

        let handle = thread::spawn(move || consumer.pop());
        thread::sleep(Duration::from_millis(50));
        queue.push(42);

        assert_eq!(handle.join().ok().flatten(), Some(42));
    }

    #[test]
    fn pool_executes_every_item_exactly_once() {
        let queue: WorkQueue<usize> = WorkQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let c = Arc::clone(&counter);
        let s = Arc::clone(&seen);
        let _pool = WorkerPool::start(4, queue.clone(), move |item| {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().unwrap().push(item);
        });

        for i in 0..100 {
            queue.push(i);
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 100 {
            assert!(std::time::Instant::now() < deadline, "pool stalled");
            thread::sleep(Duration::from_millis(10));
        }

        let mut items = seen.lock().unwrap().clone();
        items.sort_unstable();
        assert_eq!(items, (0..100).collect::<Vec<_>>());
    }
}

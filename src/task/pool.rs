//! The FIFO worker pool (C6).
//!
//! A fixed set of OS threads pull boxed closures off a shared queue.
//! `submit` enqueues and wakes one idle worker; `wait` blocks the caller
//! until the queue is drained and no task is still running; `destroy`
//! (equivalently, dropping the pool) waits, signals shutdown, and joins
//! every worker thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    task_available: Condvar,
    all_done: Condvar,
    active: AtomicUsize,
    shutdown: std::sync::atomic::AtomicBool,
}

/// A pool of worker threads draining a shared FIFO task queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn a pool with `worker_count` threads. `0` normalizes to
    /// `min(available_parallelism, 8)`.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = if worker_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(4)
        } else {
            worker_count
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(256)),
            task_available: Condvar::new(),
            all_done: Condvar::new(),
            active: AtomicUsize::new(0),
            shutdown: std::sync::atomic::AtomicBool::new(false),
        });

        let workers = (0..worker_count)
            .map(|idx| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("concord-worker-{idx}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Enqueue a task and wake one idle worker.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let mut queue = self.shared.queue.lock();
        queue.push_back(Box::new(job));
        self.shared.task_available.notify_one();
    }

    /// Block until the queue is empty and no task is currently running.
    pub fn wait(&self) {
        let mut queue = self.shared.queue.lock();
        while !queue.is_empty() || self.shared.active.load(Ordering::SeqCst) != 0 {
            self.shared.all_done.wait(&mut queue);
        }
    }

    /// Number of worker threads in this pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    // Increment while still holding the queue lock: a
                    // `wait()` caller that locks the queue right after this
                    // pop must see a nonzero active count, never a gap
                    // where the task is neither queued nor counted active.
                    shared.active.fetch_add(1, Ordering::SeqCst);
                    break Some(job);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                shared.task_available.wait(&mut queue);
            }
        };

        let Some(job) = job else { break };

        job();
        let prev_active = shared.active.fetch_sub(1, Ordering::SeqCst);

        let queue_empty = shared.queue.lock().is_empty();
        if prev_active == 1 && queue_empty {
            shared.all_done.notify_all();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.wait();
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.task_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as TestCounter;

    #[test]
    fn runs_every_submitted_task() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(TestCounter::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn wait_returns_when_queue_and_active_are_both_empty() {
        let pool = WorkerPool::new(2);
        pool.wait(); // nothing submitted yet
        pool.submit(|| std::thread::sleep(std::time::Duration::from_millis(10)));
        pool.wait();
    }

    #[test]
    fn default_worker_count_is_positive() {
        let pool = WorkerPool::new(0);
        assert!(pool.worker_count() >= 1);
    }
}

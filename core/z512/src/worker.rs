//! Fixed-capacity worker pool and the batch fan-out built on it.
//!
//! The pool is the only parallelism source in the crate. Batch operations
//! submit one task per input element and block the calling thread until
//! every element has completed; results land in a pre-sized vector indexed
//! by input position, so ordering is preserved without re-sorting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use lazy_static::lazy_static;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

const QUEUE_DEPTH_PER_WORKER: usize = 64;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    not_empty: Condvar,
    not_full: Condvar,
    closed: AtomicBool,
    queue_capacity: usize,
}

/// A bounded set of worker threads consuming a bounded task queue.
///
/// A closed pool executes submissions inline on the caller's thread, so
/// submission never fails.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn a pool with `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        let size = workers.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            closed: AtomicBool::new(false),
            queue_capacity: size * QUEUE_DEPTH_PER_WORKER,
        });
        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("z512-worker-{id}"))
                .spawn(move || worker_loop(&shared))
                .expect("spawning worker thread");
            handles.push(handle);
        }
        debug!(workers = size, "worker pool started");
        Self {
            shared,
            handles: Mutex::new(handles),
            size,
        }
    }

    /// Pool sized to three quarters of the detected hardware parallelism.
    pub fn with_default_capacity() -> Self {
        Self::new(crate::features::optimal_worker_count())
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Enqueue a task. Blocks while the queue is full; once the pool is
    /// closed the task runs inline on the calling thread instead.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Acquire) {
            task();
            return;
        }
        {
            let mut queue = self.shared.queue.lock();
            loop {
                if self.shared.closed.load(Ordering::Acquire) {
                    drop(queue);
                    task();
                    return;
                }
                if queue.len() < self.shared.queue_capacity {
                    queue.push_back(Box::new(task));
                    break;
                }
                self.shared.not_full.wait(&mut queue);
            }
        }
        self.shared.not_empty.notify_one();
    }

    /// Signal termination and wait for the workers to drain the queue.
    /// Idempotent; tasks submitted afterwards run inline.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        debug!("worker pool closed");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    shared.not_full.notify_one();
                    break Some(job);
                }
                if shared.closed.load(Ordering::Acquire) {
                    break None;
                }
                shared.not_empty.wait(&mut queue);
            }
        };
        // The queue lock is released before the job runs.
        match job {
            Some(job) => job(),
            None => return,
        }
    }
}

struct Latch {
    remaining: Mutex<usize>,
    done: Condvar,
}

impl Latch {
    fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            done: Condvar::new(),
        }
    }

    fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        *remaining -= 1;
        if *remaining == 0 {
            self.done.notify_all();
        }
    }

    fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.done.wait(&mut remaining);
        }
    }
}

/// Run `op` over every input on `pool`, one task per element.
///
/// Blocks until all elements complete. Results are returned in input
/// order; if any element fails, the earliest failure by input position is
/// returned and no partial results escape.
pub(crate) fn run_batch<I, T, F>(pool: &WorkerPool, inputs: Vec<I>, op: F) -> Result<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Result<T> + Send + Sync + 'static,
{
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    let total = inputs.len();
    let slots: Arc<Mutex<Vec<Option<Result<T>>>>> =
        Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let latch = Arc::new(Latch::new(total));
    let op = Arc::new(op);

    for (index, input) in inputs.into_iter().enumerate() {
        let slots = Arc::clone(&slots);
        let latch = Arc::clone(&latch);
        let op = Arc::clone(&op);
        pool.submit(move || {
            let outcome = op(input);
            slots.lock()[index] = Some(outcome);
            latch.count_down();
        });
    }
    latch.wait();

    let mut slots = slots.lock();
    let mut results = Vec::with_capacity(total);
    for slot in slots.iter_mut() {
        match slot.take().expect("batch task completed") {
            Ok(value) => results.push(value),
            Err(err) => return Err(err),
        }
    }
    Ok(results)
}

lazy_static! {
    static ref GLOBAL: WorkerPool = WorkerPool::with_default_capacity();
}

/// The process-wide worker pool backing all batch operations.
pub fn global() -> &'static WorkerPool {
    &GLOBAL
}

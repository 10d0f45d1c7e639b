//! Task execution substrate for the search.
//!
//! A bounded pool of worker threads with priority-ordered admission: tasks
//! are dequeued highest-priority-first, FIFO among equals. Admission is a
//! soft limit only; `has_empty_slot` tells callers whether forking another
//! subtree is worthwhile, but a submitted task is never rejected. The
//! sequential variant runs everything inline and never reports a free slot,
//! so the same search code serves both configurations.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// Admission headroom per worker. The queue may hold up to this many tasks
/// per worker before `has_empty_slot` reports the pool as busy.
const SLOTS_PER_WORKER: i64 = 10;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Completion handle for a submitted task. The sender side is dropped when
/// the task finishes, so `wait` is a plain blocking receive.
pub struct TaskHandle {
    done: Receiver<()>,
}

impl TaskHandle {
    fn completed() -> TaskHandle {
        let (tx, rx) = bounded(0);
        drop(tx);
        TaskHandle { done: rx }
    }

    pub fn wait(&self) {
        // Err means the sender is gone, i.e. the task has run.
        let _ = self.done.recv();
    }
}

pub trait Executor: Send + Sync {
    /// Queue a task. Higher `priority` runs first.
    fn submit(&self, priority: i64, task: Task) -> TaskHandle;

    /// Whether a forked task would find a worker reasonably soon.
    fn has_empty_slot(&self) -> bool;

    /// Add worker threads (no-op for the sequential variant).
    fn grow(&self, additional: usize);

    /// Run one queued task inline, if any. Lets a thread blocked in a join
    /// barrier make progress on the work it is waiting for, so a pool with
    /// every worker parked in a join cannot deadlock.
    fn help(&self) -> bool;

    /// Release/reacquire one admission slot around a blocking wait, so a
    /// caller parked in a join barrier does not count against the soft limit.
    fn enter_wait(&self);
    fn exit_wait(&self);
}

struct Prioritized {
    priority: i64,
    seq: u64,
    task: Task,
}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Prioritized {}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then submission order.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct PoolShared {
    queue: Mutex<BinaryHeap<Prioritized>>,
    ready: Condvar,
    /// Submitted-but-unfinished tasks, minus callers parked in a join.
    pending: AtomicI64,
    workers: AtomicUsize,
    seq: AtomicU64,
    shutdown: AtomicBool,
}

/// Priority-ordered bounded worker pool.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(workers: usize) -> ThreadPool {
        assert!(workers > 0);
        let pool = ThreadPool {
            shared: Arc::new(PoolShared {
                queue: Mutex::new(BinaryHeap::new()),
                ready: Condvar::new(),
                pending: AtomicI64::new(0),
                workers: AtomicUsize::new(0),
                seq: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::new()),
        };
        pool.grow(workers);
        pool
    }

    fn spawn_worker(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = thread::spawn(move || loop {
            let task = {
                let mut queue = shared.queue.lock().unwrap();
                loop {
                    if let Some(t) = queue.pop() {
                        break t;
                    }
                    if shared.shutdown.load(SeqCst) {
                        return;
                    }
                    queue = shared.ready.wait(queue).unwrap();
                }
            };
            (task.task)();
            shared.pending.fetch_sub(1, SeqCst);
        });
        self.handles.lock().unwrap().push(handle);
    }
}

impl Executor for ThreadPool {
    fn submit(&self, priority: i64, task: Task) -> TaskHandle {
        let (tx, rx) = bounded(0);
        let wrapped: Task = Box::new(move || {
            task();
            drop(tx);
        });
        self.shared.pending.fetch_add(1, SeqCst);
        let seq = self.shared.seq.fetch_add(1, SeqCst);
        self.shared.queue.lock().unwrap().push(Prioritized {
            priority,
            seq,
            task: wrapped,
        });
        self.shared.ready.notify_one();
        TaskHandle { done: rx }
    }

    fn has_empty_slot(&self) -> bool {
        let limit = self.shared.workers.load(SeqCst) as i64 * SLOTS_PER_WORKER;
        self.shared.pending.load(SeqCst) < limit
    }

    fn grow(&self, additional: usize) {
        for _ in 0..additional {
            self.spawn_worker();
        }
        self.shared.workers.fetch_add(additional, SeqCst);
    }

    fn help(&self) -> bool {
        let popped = self.shared.queue.lock().unwrap().pop();
        match popped {
            Some(task) => {
                (task.task)();
                self.shared.pending.fetch_sub(1, SeqCst);
                true
            }
            None => false,
        }
    }

    fn enter_wait(&self) {
        self.shared.pending.fetch_sub(1, SeqCst);
    }

    fn exit_wait(&self) {
        self.shared.pending.fetch_add(1, SeqCst);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, SeqCst);
        self.shared.ready.notify_all();
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

/// Runs every task inline on the calling thread. `has_empty_slot` is always
/// false, so the search never forks under this executor.
pub struct SequentialExecutor;

impl Executor for SequentialExecutor {
    fn submit(&self, _priority: i64, task: Task) -> TaskHandle {
        task();
        TaskHandle::completed()
    }

    fn has_empty_slot(&self) -> bool {
        false
    }

    fn grow(&self, _additional: usize) {}

    fn help(&self) -> bool {
        false
    }

    fn enter_wait(&self) {}

    fn exit_wait(&self) {}
}

/// Join barrier over a batch of submitted tasks.
#[derive(Default)]
pub struct FuturePool {
    handles: Mutex<Vec<TaskHandle>>,
}

impl FuturePool {
    pub fn new() -> FuturePool {
        FuturePool::default()
    }

    pub fn push(&self, handle: TaskHandle) {
        self.handles.lock().unwrap().push(handle);
    }

    /// Block until every pushed task has finished. The caller's admission
    /// slot is released for the duration, and queued tasks are executed
    /// inline while waiting (a worker may be joining on a task that sits
    /// behind it in the queue).
    pub fn join(&self, executor: &dyn Executor) {
        let handles: Vec<TaskHandle> = std::mem::take(&mut *self.handles.lock().unwrap());
        if handles.is_empty() {
            return;
        }
        executor.enter_wait();
        for handle in &handles {
            loop {
                if executor.help() {
                    continue;
                }
                match handle.done.recv_timeout(std::time::Duration::from_millis(1)) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
        }
        executor.exit_wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn sequential_runs_inline_and_reports_no_slot() {
        let exec = SequentialExecutor;
        assert!(!exec.has_empty_slot());

        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handle = exec.submit(0, Box::new(move || {
            c.fetch_add(1, SeqCst);
        }));
        // Already ran by the time submit returns.
        assert_eq!(counter.load(SeqCst), 1);
        handle.wait();
    }

    #[test]
    fn pool_executes_and_join_waits_for_all() {
        let pool = ThreadPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let futures = FuturePool::new();
        for _ in 0..20 {
            let c = Arc::clone(&counter);
            futures.push(pool.submit(0, Box::new(move || {
                c.fetch_add(1, SeqCst);
            })));
        }
        futures.join(&pool);
        assert_eq!(counter.load(SeqCst), 20);
    }

    #[test]
    fn higher_priority_tasks_run_first() {
        let pool = ThreadPool::new(1);
        let (block_tx, block_rx) = unbounded::<()>();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Occupy the single worker so the next submissions stay queued.
        let gate = pool.submit(100, Box::new(move || {
            let _ = block_rx.recv();
        }));
        let mut handles = Vec::new();
        for priority in [1i64, 5, 3] {
            let order = Arc::clone(&order);
            handles.push(pool.submit(priority, Box::new(move || {
                order.lock().unwrap().push(priority);
            })));
        }
        block_tx.send(()).unwrap();
        gate.wait();
        for handle in &handles {
            handle.wait();
        }

        assert_eq!(*order.lock().unwrap(), vec![5, 3, 1]);
    }

    #[test]
    fn slot_limit_tracks_pending_tasks() {
        let pool = ThreadPool::new(1);
        assert!(pool.has_empty_slot());

        let (block_tx, block_rx) = unbounded::<()>();
        let futures = FuturePool::new();
        futures.push(pool.submit(0, Box::new(move || {
            let _ = block_rx.recv();
        })));
        // Fill the remaining admission headroom with queued no-ops.
        for _ in 0..SLOTS_PER_WORKER {
            futures.push(pool.submit(0, Box::new(|| {})));
        }
        assert!(!pool.has_empty_slot());

        block_tx.send(()).unwrap();
        futures.join(&pool);
        assert!(pool.has_empty_slot());
    }
}

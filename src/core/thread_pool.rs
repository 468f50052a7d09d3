// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A fixed-size pool of long-lived worker threads fed from a FIFO task queue.

use super::sync::FifoCondvar;
use crate::error::{Error, Result};
use crate::macros::{log_debug, log_error, log_warn};
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::collections::VecDeque;
use std::convert::TryFrom;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Number of threads to spawn in a thread pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Spawn the number of threads reported by
    /// [`std::thread::available_parallelism()`], defaulting to 1 if the
    /// environment doesn't report one.
    AvailableParallelism,
    /// Spawn the given number of threads.
    Count(NonZeroUsize),
}

impl TryFrom<usize> for ThreadCount {
    type Error = <NonZeroUsize as TryFrom<usize>>::Error;

    fn try_from(thread_count: usize) -> std::result::Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(thread_count)?;
        Ok(ThreadCount::Count(count))
    }
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. If CPU pinning isn't supported on this
    /// platform (or not implemented), building a thread pool will panic.
    Always,
}

/// A builder for [`ThreadPool`].
pub struct ThreadPoolBuilder {
    /// Number of worker threads to spawn in the pool.
    pub num_threads: ThreadCount,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
}

impl ThreadPoolBuilder {
    /// Creates a thread pool.
    ///
    /// The pool is constructed inert: worker threads are spawned on the first
    /// call to [`ThreadPool::start()`] or [`ThreadPool::enqueue()`].
    ///
    /// ```
    /// # use parloop::{CpuPinningPolicy, ThreadCount, ThreadPoolBuilder};
    /// # use std::sync::atomic::{AtomicUsize, Ordering};
    /// # use std::sync::Arc;
    /// let pool = ThreadPoolBuilder {
    ///     num_threads: ThreadCount::try_from(4).unwrap(),
    ///     cpu_pinning: CpuPinningPolicy::No,
    /// }
    /// .build();
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// for _ in 0..10 {
    ///     let counter = counter.clone();
    ///     pool.enqueue(move || {
    ///         counter.fetch_add(1, Ordering::Relaxed);
    ///     })
    ///     .unwrap();
    /// }
    /// pool.join().unwrap();
    /// assert_eq!(counter.load(Ordering::Relaxed), 10);
    /// ```
    pub fn build(&self) -> ThreadPool {
        ThreadPool::new(self)
    }
}

/// A task enqueued on the pool.
type Job = Box<dyn FnOnce() + Send>;

/// Element of the task queue. The shutdown sentinel is an explicit variant
/// rather than a null task: each worker consumes exactly one and exits.
enum QueueItem {
    Work(Job),
    Shutdown,
}

/// The FIFO task queue shared between the pool handle and its workers.
struct TaskQueue {
    items: Mutex<VecDeque<QueueItem>>,
    ready: FifoCondvar,
}

impl TaskQueue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: FifoCondvar::new(),
        }
    }

    /// Appends an item and wakes one waiting worker.
    fn push(&self, item: QueueItem) {
        let mut items = self.items.lock().unwrap();
        items.push_back(item);
        self.ready.notify_one();
    }

    /// Blocks until an item is available and dequeues the front one.
    fn pop(&self) -> QueueItem {
        let guard = self.items.lock().unwrap();
        let mut guard = self
            .ready
            .wait_while(&self.items, guard, |items| items.is_empty());
        guard.pop_front().unwrap()
    }
}

/// Spawn/join bookkeeping, guarded by one mutex so that lazy start, join and
/// drop can't race each other.
struct WorkerSet {
    handles: Vec<JoinHandle<()>>,
    started: bool,
    joined: bool,
}

/// A fixed-size pool of worker threads executing tasks from a FIFO queue.
///
/// A pool with a single thread operates in *inline mode*: no thread is ever
/// spawned and enqueued tasks run synchronously on the caller's thread. Code
/// must therefore not assume that a task runs on a different thread than the
/// one that enqueued it.
///
/// The worker count is fixed for the lifetime of the pool. Shut the pool down
/// with [`join()`](Self::join); dropping an unjoined pool joins it too.
pub struct ThreadPool {
    num_threads: NonZeroUsize,
    cpu_pinning: CpuPinningPolicy,
    queue: Arc<TaskQueue>,
    workers: Mutex<WorkerSet>,
}

impl ThreadPool {
    /// Creates a new thread pool using the given parameters.
    fn new(builder: &ThreadPoolBuilder) -> Self {
        let num_threads = match builder.num_threads {
            ThreadCount::AvailableParallelism => {
                std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
            }
            ThreadCount::Count(count) => count,
        };

        #[cfg(any(
            miri,
            not(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux"
            ))
        ))]
        match builder.cpu_pinning {
            CpuPinningPolicy::No => (),
            CpuPinningPolicy::IfSupported => {
                log_warn!("Pinning threads to CPUs is not implemented on this platform.")
            }
            CpuPinningPolicy::Always => {
                panic!("Pinning threads to CPUs is not implemented on this platform.")
            }
        }

        Self {
            num_threads,
            cpu_pinning: builder.cpu_pinning,
            queue: Arc::new(TaskQueue::new()),
            workers: Mutex::new(WorkerSet {
                handles: Vec::new(),
                started: false,
                joined: false,
            }),
        }
    }

    /// Returns the number of worker threads of this pool.
    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }

    /// Spawns the worker threads if they aren't running yet.
    ///
    /// Idempotent: a second call is a no-op. An inline-mode pool (one thread)
    /// spawns nothing. Returns [`Error::PoolJoined`] if the pool was already
    /// joined.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock().unwrap();
        self.start_locked(&mut workers)
    }

    fn start_locked(&self, workers: &mut WorkerSet) -> Result<()> {
        if workers.joined {
            return Err(Error::PoolJoined);
        }
        if workers.started {
            return Ok(());
        }
        workers.started = true;

        if self.num_threads.get() > 1 {
            let cpu_pinning = self.cpu_pinning;
            for id in 0..self.num_threads.get() {
                let queue = self.queue.clone();
                workers.handles.push(std::thread::spawn(move || {
                    #[cfg(all(
                        not(miri),
                        any(
                            target_os = "android",
                            target_os = "dragonfly",
                            target_os = "freebsd",
                            target_os = "linux"
                        )
                    ))]
                    match cpu_pinning {
                        CpuPinningPolicy::No => (),
                        CpuPinningPolicy::IfSupported => {
                            let mut cpu_set = CpuSet::new();
                            if let Err(_e) = cpu_set.set(id) {
                                log_warn!("Failed to set CPU affinity for worker #{id}: {_e}");
                            } else if let Err(_e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
                                log_warn!("Failed to set CPU affinity for worker #{id}: {_e}");
                            } else {
                                log_debug!("Pinned worker #{id} to CPU #{id}");
                            }
                        }
                        CpuPinningPolicy::Always => {
                            let mut cpu_set = CpuSet::new();
                            if let Err(e) = cpu_set.set(id) {
                                panic!("Failed to set CPU affinity for worker #{id}: {e}");
                            } else if let Err(e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
                                panic!("Failed to set CPU affinity for worker #{id}: {e}");
                            } else {
                                log_debug!("Pinned worker #{id} to CPU #{id}");
                            }
                        }
                    }
                    #[cfg(not(all(
                        not(miri),
                        any(
                            target_os = "android",
                            target_os = "dragonfly",
                            target_os = "freebsd",
                            target_os = "linux"
                        )
                    )))]
                    let _ = (cpu_pinning, id);
                    worker_loop(id, &queue)
                }));
            }
            log_debug!(
                "[main thread] Spawned {} worker threads",
                self.num_threads.get()
            );
        }
        Ok(())
    }

    /// Enqueues a task, lazily starting the pool on first use.
    ///
    /// In inline mode the task runs synchronously on the calling thread
    /// before this returns. Otherwise it is appended to the FIFO queue and
    /// one waiting worker is woken. Returns [`Error::PoolJoined`] if the pool
    /// was already joined.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        {
            let mut workers = self.workers.lock().unwrap();
            self.start_locked(&mut workers)?;
        }

        if self.num_threads.get() == 1 {
            // Inline mode: no threads to hand the task to.
            job();
            return Ok(());
        }

        self.queue.push(QueueItem::Work(Box::new(job)));
        Ok(())
    }

    /// Shuts the pool down: sends one shutdown sentinel per worker, then
    /// blocks until every worker thread has exited.
    ///
    /// All tasks enqueued before this call are executed before any worker
    /// consumes its sentinel. A pool that was never started is simply marked
    /// joined. Returns [`Error::PoolJoined`] on a second call.
    pub fn join(&self) -> Result<()> {
        let mut workers = self.workers.lock().unwrap();
        if workers.joined {
            return Err(Error::PoolJoined);
        }
        workers.joined = true;
        self.shutdown_locked(&mut workers);
        Ok(())
    }

    fn shutdown_locked(&self, workers: &mut WorkerSet) {
        if workers.handles.is_empty() {
            return;
        }
        for _ in 0..workers.handles.len() {
            self.queue.push(QueueItem::Shutdown);
        }
        log_debug!("[main thread] Joining workers...");
        for (_i, handle) in workers.handles.drain(..).enumerate() {
            match handle.join() {
                Ok(()) => log_debug!("[main thread] Worker {_i} joined"),
                Err(_) => log_error!("[main thread] Worker {_i} panicked"),
            }
        }
        log_debug!("[main thread] Joined workers.");
    }
}

impl Drop for ThreadPool {
    /// Joins the workers if [`join()`](Self::join) was never called.
    fn drop(&mut self) {
        let mut workers = self.workers.lock().unwrap();
        if !workers.joined {
            workers.joined = true;
            self.shutdown_locked(&mut workers);
        }
    }
}

/// Main procedure of a worker thread: dequeue one item at a time until the
/// shutdown sentinel arrives.
fn worker_loop(_id: usize, queue: &TaskQueue) {
    log_debug!("[worker {_id}] Started");
    loop {
        match queue.pop() {
            QueueItem::Work(job) => job(),
            QueueItem::Shutdown => break,
        }
    }
    log_debug!("[worker {_id}] Received shutdown sentinel, exiting");
}

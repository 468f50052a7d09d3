// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The loop dispatcher: partitions a strided range across the thread pool and
//! blocks the caller until every partition has completed.

use super::range::LoopRange;
use super::sync::FifoCondvar;
use super::thread_pool::ThreadPool;
use crate::error::{Error, Result};
use crate::macros::log_debug;
use crossbeam_utils::CachePadded;
use std::sync::{Arc, Mutex};

/// A unit of work defined over a contiguous, strided sub-range of a larger
/// iteration domain.
///
/// The implementation must process exactly and only the indices
/// `begin, begin + step, begin + 2 * step, ...` below `end`. Partitions of the
/// same dispatch may run in any order relative to each other, so a task must
/// not assume that lower indices have already been processed.
///
/// Any closure `FnMut(i64, i64, i64)` is a loop task.
pub trait LoopTask: Send {
    /// Processes the sub-range `[begin, end)` walked by `step`.
    fn run(&mut self, begin: i64, end: i64, step: i64);
}

impl<F: FnMut(i64, i64, i64) + Send> LoopTask for F {
    fn run(&mut self, begin: i64, end: i64, step: i64) {
        self(begin, end, step)
    }
}

/// Completion tracking for one dispatch call: the number of partitions still
/// running, and the condition the dispatching thread blocks on.
struct DispatchState {
    outstanding: CachePadded<Mutex<usize>>,
    done: FifoCondvar,
}

/// Partitions a configured [`LoopRange`] across a [`ThreadPool`] and runs one
/// task instance per partition, blocking until all of them finish.
///
/// The pool is an explicit borrow rather than process-global state; thread the
/// dispatcher (or the pool) through whatever needs it.
pub struct LoopDispatcher<'pool> {
    pool: &'pool ThreadPool,
    range: Option<LoopRange>,
}

impl<'pool> LoopDispatcher<'pool> {
    /// Creates a dispatcher with no loop range configured yet.
    pub fn new(pool: &'pool ThreadPool) -> Self {
        Self { pool, range: None }
    }

    /// Creates a dispatcher over the given loop range.
    pub fn with_range(pool: &'pool ThreadPool, range: LoopRange) -> Self {
        Self {
            pool,
            range: Some(range),
        }
    }

    /// Sets or replaces the loop range for subsequent
    /// [`dispatch()`](Self::dispatch) calls.
    pub fn set_loop_range(&mut self, range: LoopRange) {
        self.range = Some(range);
    }

    /// Runs the configured loop range, possibly split across the pool's
    /// worker threads, and returns once every partition has completed.
    ///
    /// The factory is invoked once per partition, so each partition owns an
    /// independent task instance; there is no shared mutable state between
    /// partitions unless the task type introduces it. With a single-thread
    /// pool, or when the range is too small to split given its granularity
    /// hint, a single task runs inline on the calling thread with no pool
    /// interaction at all.
    ///
    /// Returns the exclusive ending index actually reached by walking the
    /// full range: no index at or beyond it was touched. Returns
    /// [`Error::RangeNotSet`] if no loop range was configured.
    pub fn dispatch<T: LoopTask + 'static>(&self, factory: impl Fn() -> T) -> Result<i64> {
        let range = self.range.ok_or(Error::RangeNotSet)?;
        let task_count = range.optimal_task_count(self.pool.num_threads().get());

        if task_count == 1 {
            log_debug!("[dispatch] Running {range:?} inline");
            let mut task = factory();
            task.run(range.begin(), range.end(), range.step());
        } else {
            self.dispatch_tasks(&range, task_count, factory)?;
        }

        Ok(range.ending_index())
    }

    /// Enqueues one completion-wrapped task per partition and waits for the
    /// last one to report done.
    fn dispatch_tasks<T: LoopTask + 'static>(
        &self,
        range: &LoopRange,
        task_count: usize,
        factory: impl Fn() -> T,
    ) -> Result<()> {
        let partitions = range.partitions(task_count);
        log_debug!("[dispatch] Running {range:?} as {task_count} partitions");

        let state = Arc::new(DispatchState {
            outstanding: CachePadded::new(Mutex::new(task_count)),
            done: FifoCondvar::new(),
        });

        // Hold the outstanding-count lock across the enqueues: a partition
        // that completes early then blocks on the decrement until this thread
        // is registered as a waiter, so the final notification can't be lost.
        let guard = state.outstanding.lock().unwrap();
        for partition in partitions {
            let mut task = factory();
            let state = state.clone();
            self.pool.enqueue(move || {
                task.run(partition.begin, partition.end, partition.step);

                let mut outstanding = state.outstanding.lock().unwrap();
                *outstanding -= 1;
                if *outstanding == 0 {
                    state.done.notify_one();
                }
            })?;
        }

        let guard = state
            .done
            .wait_while(&state.outstanding, guard, |outstanding| *outstanding > 0);
        drop(guard);
        log_debug!("[dispatch] All {task_count} partitions completed");
        Ok(())
    }
}

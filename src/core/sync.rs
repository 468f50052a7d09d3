// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Synchronization primitives: a signalable event and a condition variable
//! with guaranteed FIFO wake order.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Reset behavior of an [`Event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventMode {
    /// A single waiter wakes per signal; the event re-arms automatically.
    AutoReset,
    /// The event stays signaled until explicitly [`reset()`](Event::reset).
    ManualReset,
}

/// A signalable event, created once and signaled/reset many times.
///
/// An auto-reset event wakes exactly one waiter per [`signal()`](Self::signal)
/// and re-arms itself; a manual-reset event releases every waiter until
/// [`reset()`](Self::reset) is called.
pub struct Event {
    signaled: Mutex<bool>,
    condvar: Condvar,
    mode: EventMode,
}

impl Event {
    /// Creates a new event in the non-signaled state.
    pub fn new(mode: EventMode) -> Self {
        Self::with_state(mode, false)
    }

    /// Creates a new event that starts out signaled.
    pub fn new_signaled(mode: EventMode) -> Self {
        Self::with_state(mode, true)
    }

    fn with_state(mode: EventMode, signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(signaled),
            condvar: Condvar::new(),
            mode,
        }
    }

    /// Sets the signaled state, waking one waiter (auto-reset) or all waiters
    /// (manual-reset).
    pub fn signal(&self) {
        *self.signaled.lock().unwrap() = true;
        match self.mode {
            EventMode::AutoReset => self.condvar.notify_one(),
            EventMode::ManualReset => self.condvar.notify_all(),
        }
    }

    /// Clears the signaled state. Only meaningful for manual-reset events;
    /// auto-reset events re-arm on their own.
    pub fn reset(&self) {
        *self.signaled.lock().unwrap() = false;
    }

    /// Blocks the calling thread until the event is signaled.
    pub fn wait(&self) {
        let mut signaled = self
            .condvar
            .wait_while(self.signaled.lock().unwrap(), |signaled| !*signaled)
            .unwrap();
        if self.mode == EventMode::AutoReset {
            *signaled = false;
        }
    }

    /// Blocks until the event is signaled or the timeout elapses. Returns
    /// `true` if the event was signaled, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (mut signaled, result) = self
            .condvar
            .wait_timeout_while(self.signaled.lock().unwrap(), timeout, |signaled| !*signaled)
            .unwrap();
        if result.timed_out() && !*signaled {
            return false;
        }
        if self.mode == EventMode::AutoReset {
            *signaled = false;
        }
        true
    }
}

/// A condition variable that wakes waiters in FIFO order.
///
/// The standard library's [`Condvar`] makes no fairness guarantee, so this
/// keeps an explicit queue of per-call auto-reset [`Event`]s: each `wait`
/// registers a fresh event that lives only for the duration of that call, and
/// [`notify_one()`](Self::notify_one) always signals the oldest one.
///
/// Notifiers must hold the same mutex that waiters release/re-acquire around
/// [`wait()`](Self::wait); otherwise a notification can race a waiter that
/// hasn't registered yet and be lost.
pub struct FifoCondvar {
    waiters: Mutex<VecDeque<Arc<Event>>>,
}

impl FifoCondvar {
    /// Creates a new condition variable with no waiters.
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Atomically releases `guard` and blocks until notified, then re-acquires
    /// the mutex before returning.
    ///
    /// The waiter is registered before the guard is released, both under the
    /// internal lock, so a notifier holding `mutex` can never miss it.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        let waiter = Arc::new(Event::new(EventMode::AutoReset));
        {
            let mut waiters = self.waiters.lock().unwrap();
            waiters.push_back(waiter.clone());
            drop(guard);
        }
        waiter.wait();
        mutex.lock().unwrap()
    }

    /// Blocks until the predicate returns `false`, re-checking it every time
    /// the thread is woken.
    pub fn wait_while<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        while predicate(&mut guard) {
            guard = self.wait(guard, mutex);
        }
        guard
    }

    /// Wakes the longest-waiting blocked caller, if any.
    pub fn notify_one(&self) {
        let mut waiters = self.waiters.lock().unwrap();
        if let Some(waiter) = waiters.pop_front() {
            waiter.signal();
        }
    }

    /// Wakes every blocked caller.
    pub fn notify_all(&self) {
        let mut waiters = self.waiters.lock().unwrap();
        while let Some(waiter) = waiters.pop_front() {
            waiter.signal();
        }
    }
}

impl Default for FifoCondvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn manual_reset_event_stays_signaled() {
        let event = Event::new(EventMode::ManualReset);
        event.signal();
        assert!(event.wait_timeout(SHORT));
        // Still signaled, a second wait doesn't block.
        assert!(event.wait_timeout(SHORT));
        event.reset();
        assert!(!event.wait_timeout(SHORT));
    }

    #[test]
    fn auto_reset_event_rearms() {
        let event = Event::new(EventMode::AutoReset);
        event.signal();
        assert!(event.wait_timeout(SHORT));
        // The first wait consumed the signal.
        assert!(!event.wait_timeout(SHORT));
    }

    #[test]
    fn initially_signaled_event() {
        let event = Event::new_signaled(EventMode::AutoReset);
        assert!(event.wait_timeout(SHORT));
    }

    #[test]
    fn event_wait_timeout_elapses() {
        let event = Event::new(EventMode::AutoReset);
        assert!(!event.wait_timeout(SHORT));
    }

    #[test]
    fn event_wakes_blocked_waiter() {
        let event = Arc::new(Event::new(EventMode::AutoReset));
        let waiter = std::thread::spawn({
            let event = event.clone();
            move || event.wait()
        });
        // Give the waiter a chance to block before signaling.
        std::thread::sleep(SHORT);
        event.signal();
        waiter.join().unwrap();
    }

    #[test]
    fn auto_reset_signal_wakes_one_of_many() {
        let event = Arc::new(Event::new(EventMode::AutoReset));
        let woken = Arc::new(Mutex::new(0usize));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let event = event.clone();
                let woken = woken.clone();
                std::thread::spawn(move || {
                    event.wait();
                    *woken.lock().unwrap() += 1;
                })
            })
            .collect();

        std::thread::sleep(SHORT);
        assert_eq!(*woken.lock().unwrap(), 0);
        for expected in 1..=3 {
            event.signal();
            while *woken.lock().unwrap() < expected {
                std::thread::yield_now();
            }
            // Exactly one waiter wakes per signal.
            std::thread::sleep(Duration::from_millis(10));
            assert_eq!(*woken.lock().unwrap(), expected);
        }
        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    /// State shared by the FIFO fairness tests: the mutex associated with the
    /// condition variable, guarding the IDs of woken waiters.
    struct FairnessState {
        mutex: Mutex<Vec<usize>>,
        condvar: FifoCondvar,
    }

    fn spawn_ordered_waiters(
        state: &Arc<FairnessState>,
        count: usize,
    ) -> Vec<std::thread::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let thread_state = state.clone();
            handles.push(std::thread::spawn(move || {
                let guard = thread_state.mutex.lock().unwrap();
                let mut guard = thread_state.condvar.wait(guard, &thread_state.mutex);
                guard.push(id);
            }));
            // Wait until this waiter is registered in the FIFO queue before
            // spawning the next one, so registration order is fixed.
            while state.condvar.waiters.lock().unwrap().len() < id + 1 {
                std::thread::yield_now();
            }
        }
        handles
    }

    #[test]
    fn notify_one_wakes_in_fifo_order() {
        const NUM_WAITERS: usize = 4;
        let state = Arc::new(FairnessState {
            mutex: Mutex::new(Vec::new()),
            condvar: FifoCondvar::new(),
        });
        let handles = spawn_ordered_waiters(&state, NUM_WAITERS);

        for step in 0..NUM_WAITERS {
            {
                let _guard = state.mutex.lock().unwrap();
                state.condvar.notify_one();
            }
            // Wait for the woken thread to record itself before waking the
            // next one, so the recorded order reflects the wake order.
            while state.mutex.lock().unwrap().len() < step + 1 {
                std::thread::yield_now();
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }
        let woken = state.mutex.lock().unwrap();
        assert_eq!(*woken, (0..NUM_WAITERS).collect::<Vec<_>>());
    }

    #[test]
    fn notify_all_wakes_everyone() {
        const NUM_WAITERS: usize = 4;
        let state = Arc::new(FairnessState {
            mutex: Mutex::new(Vec::new()),
            condvar: FifoCondvar::new(),
        });
        let handles = spawn_ordered_waiters(&state, NUM_WAITERS);

        {
            let _guard = state.mutex.lock().unwrap();
            state.condvar.notify_all();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let mut woken = state.mutex.lock().unwrap().clone();
        woken.sort_unstable();
        assert_eq!(woken, (0..NUM_WAITERS).collect::<Vec<_>>());
    }

    #[test]
    fn notify_without_waiters_is_a_no_op() {
        let condvar = FifoCondvar::new();
        condvar.notify_one();
        condvar.notify_all();
    }

    #[test]
    fn wait_while_rechecks_predicate() {
        let state = Arc::new(FairnessState {
            mutex: Mutex::new(Vec::new()),
            condvar: FifoCondvar::new(),
        });

        let consumer = std::thread::spawn({
            let state = state.clone();
            move || {
                let guard = state.mutex.lock().unwrap();
                let guard = state
                    .condvar
                    .wait_while(&state.mutex, guard, |items| items.len() < 3);
                guard.len()
            }
        });

        for i in 0..3 {
            std::thread::sleep(Duration::from_millis(10));
            let mut guard = state.mutex.lock().unwrap();
            guard.push(i);
            state.condvar.notify_one();
        }
        assert_eq!(consumer.join().unwrap(), 3);
    }
}

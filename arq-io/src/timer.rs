//! Deadline queue driven by one background thread
//!
//! A [`TimerQueue`] holds at most one deadline per key. A dedicated thread
//! sleeps until the earliest deadline, removes it and calls the expiry
//! handler with its key. Scheduling a key that is already pending moves its
//! deadline; cancelling removes it.
//!
//! The handler runs with the queue unlocked, so it may call back into
//! [`TimerQueue::schedule`] through a clone of a [`TimerHandle`].

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct TimerState<K> {
    /// Deadlines ordered by expiry
    deadlines: BTreeSet<(Instant, K)>,
    /// Current deadline of each pending key
    by_key: HashMap<K, Instant>,
    shutdown: bool,
}

struct Shared<K> {
    state: Mutex<TimerState<K>>,
    wake: Condvar,
}

/// Cloneable handle for scheduling and cancelling deadlines
pub struct TimerHandle<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for TimerHandle<K> {
    fn clone(&self) -> Self {
        TimerHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Ord + Hash + Copy> TimerHandle<K> {
    /// Arm `key` to expire after `delay`, replacing any pending deadline
    pub fn schedule(&self, key: K, delay: Duration) {
        self.schedule_at(key, Instant::now() + delay);
    }

    /// Arm `key` to expire at `deadline`, replacing any pending deadline
    pub fn schedule_at(&self, key: K, deadline: Instant) {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        if let Some(previous) = state.by_key.insert(key, deadline) {
            state.deadlines.remove(&(previous, key));
        }
        state.deadlines.insert((deadline, key));
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Disarm `key`, returning whether it was pending
    pub fn cancel(&self, key: K) -> bool {
        let mut state = self.shared.state.lock();
        match state.by_key.remove(&key) {
            Some(deadline) => {
                state.deadlines.remove(&(deadline, key));
                true
            }
            None => false,
        }
    }

    /// Number of pending deadlines
    pub fn len(&self) -> usize {
        self.shared.state.lock().by_key.len()
    }

    /// Check if no deadline is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deadline queue with its expiry thread
///
/// Dropping the queue stops the thread; pending deadlines are discarded.
pub struct TimerQueue<K> {
    handle: TimerHandle<K>,
    thread: Option<JoinHandle<()>>,
}

impl<K> TimerQueue<K>
where
    K: Ord + Hash + Copy + Send + 'static,
{
    /// Start a queue whose thread calls `on_expire` for each expired key
    pub fn spawn<F>(name: &str, on_expire: F) -> io::Result<Self>
    where
        F: FnMut(K) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                deadlines: BTreeSet::new(),
                by_key: HashMap::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&worker, on_expire))?;

        Ok(TimerQueue {
            handle: TimerHandle { shared },
            thread: Some(thread),
        })
    }

    /// Get a handle for use from other threads
    pub fn handle(&self) -> TimerHandle<K> {
        self.handle.clone()
    }

    /// Arm `key` to expire after `delay`
    pub fn schedule(&self, key: K, delay: Duration) {
        self.handle.schedule(key, delay);
    }

    /// Disarm `key`
    pub fn cancel(&self, key: K) -> bool {
        self.handle.cancel(key)
    }

    /// Number of pending deadlines
    pub fn len(&self) -> usize {
        self.handle.len()
    }

    /// Check if no deadline is pending
    pub fn is_empty(&self) -> bool {
        self.handle.is_empty()
    }

    /// Stop the expiry thread and wait for it to exit
    pub fn shutdown(&mut self) {
        self.stop();
    }
}

impl<K> TimerQueue<K> {
    fn stop(&mut self) {
        {
            let mut state = self.handle.shared.state.lock();
            state.shutdown = true;
            state.deadlines.clear();
            state.by_key.clear();
        }
        self.handle.shared.wake.notify_all();

        if let Some(thread) = self.thread.take() {
            // the handler may be the one dropping us
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                tracing::warn!("Timer thread panicked");
            }
        }
    }
}

impl<K> Drop for TimerQueue<K> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<K, F>(shared: &Shared<K>, mut on_expire: F)
where
    K: Ord + Hash + Copy,
    F: FnMut(K),
{
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        match state.deadlines.first().copied() {
            Some((deadline, key)) if deadline <= Instant::now() => {
                state.deadlines.remove(&(deadline, key));
                state.by_key.remove(&key);
                MutexGuard::unlocked(&mut state, || on_expire(key));
            }
            Some((deadline, _)) => {
                shared.wake.wait_until(&mut state, deadline);
            }
            None => {
                shared.wake.wait(&mut state);
            }
        }
    }
    tracing::trace!("Timer thread exiting");
}

//! Producer/consumer thread pool.
//!
//! A fixed number of workers drain an unbounded FIFO queue guarded
//! by a mutex and condition variable. `offer` never blocks. Dropping
//! the pool signals termination, wakes every worker, and joins them;
//! tasks still queued at that point are abandoned.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct State {
    done: bool,
    tasks: VecDeque<Task>,
}

struct Inner {
    state: Mutex<State>,
    available: Condvar,
}

pub struct ThreadPool {
    inner: Arc<Inner>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `num` workers that block waiting for tasks.
    pub fn new(num: usize) -> ThreadPool {
        assert!(num >= 1, "minimum thread pool size is 1");
        debug!("starting {num} threads");
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                done: false,
                tasks: VecDeque::new(),
            }),
            available: Condvar::new(),
        });
        let threads = (0..num)
            .map(|id| {
                let inner = inner.clone();
                thread::spawn(move || run_worker(id, &inner))
            })
            .collect();
        ThreadPool { inner, threads }
    }

    /// Enqueues a task and returns immediately.
    pub fn offer(&self, task: Task) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.tasks.push_back(task);
        drop(state);
        self.inner.available.notify_one();
    }
}

fn run_worker(id: usize, inner: &Inner) {
    debug!("thread {id} starting");
    loop {
        let task = {
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if state.done {
                    debug!("thread {id} stopping");
                    return;
                }
                if let Some(task) = state.tasks.pop_front() {
                    break task;
                }
                state = inner
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        debug!("thread {id} picking up task");
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("thread {id}: task panicked");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        debug!("shutting down all threads");
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.done = true;
        }
        self.inner.available.notify_all();
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                error!("worker thread panicked");
            }
        }
        debug!("all threads shut down");
    }
}

//! A generic, fixed-size worker pool (§1 "a generic worker-pool utility
//! that is unused by the core", §2.1, §5.1). Ported from
//! `examples/original_source/myshell/src/thread_pool.cpp`'s
//! condition-variable-based queue into `std::thread` + `std::sync::mpsc`.
//!
//! Nothing in the shell's control flow constructs a [`WorkerPool`] — it is
//! retained as API surface, covered by its own unit tests, and not wired
//! into the read-eval loop, the launcher, or the monitor.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` worker threads (at least one); each blocks on the
    /// shared task queue until a task arrives or the pool is dropped.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                thread::spawn(move || loop {
                    let task = { receiver.lock().unwrap().recv() };
                    match task {
                        Ok(task) => task(),
                        Err(_) => break,
                    }
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Enqueues `task` for execution on the next free worker. Silently
    /// dropped if the pool is already shutting down (sender closed).
    pub fn execute<F: FnOnce() + Send + 'static>(&self, task: F) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(task));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel wakes every worker blocked in `recv()` with
        // an `Err`, which ends its loop.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn runs_all_submitted_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool); // joins workers, so every queued task has run by now
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn zero_size_request_still_spawns_one_worker() {
        let pool = WorkerPool::new(0);
        let (tx, rx) = channel();
        pool.execute(move || tx.send(()).unwrap());
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }
}

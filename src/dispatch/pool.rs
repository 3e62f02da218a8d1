//! The shared worker pool: a fixed set of OS threads draining one shared
//! job queue. `ctx = Pool` routes here for one-shot [`Callable`]s.
//!
//! Each pool worker loops: pop one job, run it, loop again, waiting for
//! the next one.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::dispatch::Callable;

enum Job {
    Run(Callable),
    Shutdown,
}

/// A handle to the shared pool. Cloning shares the same queue and workers.
#[derive(Clone)]
pub struct Pool {
    tx: mpsc::Sender<Job>,
}

impl Pool {
    /// Spawn `size` worker threads draining a shared queue.
    pub fn new(size: usize) -> Pool {
        assert!(size > 0, "pool must have at least one worker");
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        for index in 0..size {
            let rx = Arc::clone(&rx);
            thread::Builder::new()
                .name(format!("pledge-pool-{index}"))
                .spawn(move || run_worker(&rx))
                .expect("failed to spawn pool worker thread");
        }

        Pool { tx }
    }

    /// Schedule `callable` to run on whichever pool worker picks it up
    /// next.
    pub fn schedule(&self, callable: Callable) {
        // A closed receiver means every worker thread has already shut
        // down; there is nothing left to run on, so the job is dropped
        // rather than panicking the caller.
        let _ = self.tx.send(Job::Run(callable));
    }
}

fn run_worker(rx: &Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = {
            let rx = rx.lock().expect("pool queue mutex poisoned");
            rx.recv()
        };
        match job {
            Ok(Job::Run(callable)) => callable.invoke(),
            Ok(Job::Shutdown) | Err(_) => break,
        }
    }
    crate::registry::teardown_current_thread();
}

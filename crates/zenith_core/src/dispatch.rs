//! Main-loop hand-off
//!
//! Database and file completions arrive on background tasks, but anything
//! that touches host-owned objects must run on the host's tick. Background
//! code queues work with [`TickDispatcher::run_on_next_tick`] and the host
//! calls [`TickDispatcher::drain`] once per tick.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queue of work waiting for the next host tick
#[derive(Clone, Default)]
pub struct TickDispatcher {
    queue: Arc<Mutex<VecDeque<Job>>>,
}

impl TickDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` to run during the next [`drain`](Self::drain).
    pub fn run_on_next_tick<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.lock().push_back(Box::new(job));
    }

    /// Runs every job queued before this call and returns how many ran.
    ///
    /// Jobs queued by a running job wait for the following tick. A panicking
    /// job is logged and does not stop the rest of the batch.
    pub fn drain(&self) -> usize {
        let batch: Vec<Job> = {
            let mut queue = self.queue.lock();
            queue.drain(..).collect()
        };

        let count = batch.len();
        for job in batch {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                error!("❌ Tick job panicked");
            }
        }

        if count > 0 {
            trace!("Drained {} tick jobs", count);
        }
        count
    }

    /// Number of jobs waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl std::fmt::Debug for TickDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDispatcher")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_in_order_on_drain() {
        let dispatcher = TickDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            dispatcher.run_on_next_tick(move || log.lock().push(i));
        }

        assert_eq!(dispatcher.pending(), 3);
        assert!(log.lock().is_empty());
        assert_eq!(dispatcher.drain(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(dispatcher.drain(), 0);
    }

    #[test]
    fn test_nested_jobs_wait_for_next_tick() {
        let dispatcher = TickDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_dispatcher = dispatcher.clone();
        let inner_counter = counter.clone();
        dispatcher.run_on_next_tick(move || {
            inner_counter.fetch_add(1, Ordering::SeqCst);
            let counter = inner_counter.clone();
            inner_dispatcher.run_on_next_tick(move || {
                counter.fetch_add(10, Ordering::SeqCst);
            });
        });

        assert_eq!(dispatcher.drain(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.drain(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_panicking_job_does_not_stop_batch() {
        let dispatcher = TickDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));

        dispatcher.run_on_next_tick(|| panic!("boom"));
        let c = counter.clone();
        dispatcher.run_on_next_tick(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.drain(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

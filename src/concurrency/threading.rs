//! Threading - minimal thread fan-out abstraction
//!
//! Batched evaluation only needs two operations from its environment: the
//! number of threads that can usefully run in parallel, and a way to run a
//! set of borrowed tasks to completion. Implementations must not return
//! from [`Threading::run_parallel`] before every task has finished, which
//! is what lets callers hand out disjoint `&mut` borrows per task.

use std::thread;

/// A unit of work handed to [`Threading::run_parallel`]. Tasks may borrow
/// from the caller's stack; the parallel region joins before returning.
pub type Task<'env> = Box<dyn FnOnce() + Send + 'env>;

pub trait Threading: Send + Sync {
    /// The number of threads that can efficiently run in parallel.
    fn recommended_thread_count(&self) -> usize;

    /// Runs all tasks concurrently and waits for them to finish.
    fn run_parallel<'env>(&self, tasks: Vec<Task<'env>>);
}

/// [`Threading`] backed by `std::thread::scope`.
///
/// The first task runs on the calling thread, mirroring a worker-0-on-main
/// layout; the rest get one scoped thread each.
#[derive(Debug, Clone)]
pub struct StdThreading {
    thread_count: usize,
}

impl StdThreading {
    pub fn new() -> Self {
        StdThreading {
            thread_count: num_cpus::get(),
        }
    }

    pub fn with_thread_count(thread_count: usize) -> Self {
        StdThreading {
            thread_count: thread_count.max(1),
        }
    }
}

impl Default for StdThreading {
    fn default() -> Self {
        StdThreading::new()
    }
}

impl Threading for StdThreading {
    fn recommended_thread_count(&self) -> usize {
        self.thread_count
    }

    fn run_parallel<'env>(&self, tasks: Vec<Task<'env>>) {
        let mut tasks = tasks.into_iter();
        let Some(first) = tasks.next() else {
            return;
        };
        thread::scope(|scope| {
            let handles: Vec<_> = tasks.map(|task| scope.spawn(task)).collect();
            first();
            for handle in handles {
                if let Err(payload) = handle.join() {
                    std::panic::resume_unwind(payload);
                }
            }
        });
    }
}

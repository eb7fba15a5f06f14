//! Worker pool for per-group tasks.
//!
//! Tasks never share mutable state: each returns its own result and the
//! caller merges them after the parallel region.

use rayon::prelude::*;
use tracing::{trace, warn};

use crate::error::{FrameError, Result};

pub struct ThreadPool {
    pool: Option<rayon::ThreadPool>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::sequential()
    }
}

impl ThreadPool {
    /// Runs every task on the calling thread.
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// A pool with `num_threads` workers; zero falls back to sequential execution.
    pub fn new(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("jxlexp-worker-{i}"))
            .build()
            .map_err(|_| FrameError::InvalidArgument)?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Parallel-for over `0..num_tasks`.
    ///
    /// `init` receives the worker count before any task starts and builds the
    /// state shared by the tasks; `body` receives that state and
    /// `(task, thread)`. The state is handed back with one result per task,
    /// in task order.
    pub fn run<S, T, I, F>(
        &self,
        num_tasks: usize,
        init: I,
        body: F,
        name: &str,
    ) -> Result<(S, Vec<Result<T>>)>
    where
        S: Sync,
        T: Send,
        I: FnOnce(usize) -> Result<S>,
        F: Fn(&S, usize, usize) -> Result<T> + Sync + Send,
    {
        let state = init(self.num_threads())?;
        trace!(name, num_tasks, threads = self.num_threads(), "parallel run");
        let results = match &self.pool {
            None => (0..num_tasks).map(|task| body(&state, task, 0)).collect(),
            Some(pool) => pool.install(|| {
                (0..num_tasks)
                    .into_par_iter()
                    .map(|task| body(&state, task, rayon::current_thread_index().unwrap_or(0)))
                    .collect()
            }),
        };
        Ok((state, results))
    }
}

/// Collapses per-task results into one outcome; any failure fails the batch.
pub fn reduce_task_results<T>(results: Vec<Result<T>>, aggregate: FrameError) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(results.len());
    let mut failed = false;
    for (task, r) in results.into_iter().enumerate() {
        match r {
            Ok(v) => out.push(v),
            Err(e) => {
                warn!(task, error = %e, "task failed");
                failed = true;
            }
        }
    }
    if failed {
        return Err(aggregate);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_in_task_order() {
        let pool = ThreadPool::new(3).unwrap();
        let (_, results) = pool
            .run(10, |_| Ok(()), |_, task, _thread| Ok(task * 2), "double")
            .unwrap();
        let values = reduce_task_results(results, FrameError::DcGroupFailed).unwrap();
        assert_eq!(values, (0..10).map(|t| t * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_one_failure_fails_batch_but_all_tasks_run() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let ran = AtomicUsize::new(0);
        let pool = ThreadPool::sequential();
        let (_, results) = pool
            .run(
                5,
                |_| Ok(()),
                |_, task, _| {
                    ran.fetch_add(1, Ordering::Relaxed);
                    if task == 1 {
                        Err(FrameError::InvalidCoefficients)
                    } else {
                        Ok(())
                    }
                },
                "fail",
            )
            .unwrap();
        assert_eq!(ran.load(Ordering::Relaxed), 5);
        assert_eq!(
            reduce_task_results(results, FrameError::AcGroupFailed),
            Err(FrameError::AcGroupFailed)
        );
    }

    #[test]
    fn test_state_is_shared_and_returned() {
        let pool = ThreadPool::new(2).unwrap();
        let (slots, results) = pool
            .run(
                4,
                |threads| Ok(vec![10usize; threads]),
                |slots, task, thread| Ok(slots[thread.min(slots.len() - 1)] + task),
                "state",
            )
            .unwrap();
        assert_eq!(slots.len(), 2);
        let values = reduce_task_results(results, FrameError::AcGroupFailed).unwrap();
        assert_eq!(values, vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_init_failure_skips_tasks() {
        let pool = ThreadPool::sequential();
        let r = pool.run::<(), (), _, _>(
            3,
            |_| Err(FrameError::InvalidArgument),
            |_, _, _| Ok(()),
            "init",
        );
        assert!(r.is_err());
    }
}

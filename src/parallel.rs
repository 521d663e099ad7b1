use std::sync::Arc;

/// Fork-join adapter for the data-parallel parts of the solvers.
///
/// Wraps a dedicated rayon pool so the worker count stays a per-solver
/// parameter instead of a process-wide setting. With zero workers the
/// closures run inline on the caller thread.
#[derive(Clone, Default)]
pub struct Workers {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Workers {
    /// Create a pool with the given number of worker threads
    /// (0 = run everything on the caller thread).
    pub fn new(num_workers: usize) -> Self {
        if num_workers == 0 {
            return Self { pool: None };
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .expect("failed to spawn worker threads");
        Self {
            pool: Some(Arc::new(pool)),
        }
    }

    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// Run `op` inside the pool (parallel iterators in `op` use its workers),
    /// or directly when no pool exists.
    pub fn install<R, Op>(&self, op: Op) -> R
    where
        Op: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }
}

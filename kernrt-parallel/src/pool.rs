use std::sync::OnceLock;

use crate::config::parallel_config;

/// A wrapper around the Rayon thread pool that executes kernel blocks.
///
/// If the pool could not be created (eg. on platforms without threads) work
/// runs directly on the calling thread.
pub struct ThreadPool {
    pool: Option<rayon::ThreadPool>,
}

impl ThreadPool {
    /// Run a function in the thread pool.
    ///
    /// This corresponds to [`rayon::ThreadPool::install`]. Calls from a thread
    /// that already belongs to the pool run `op` directly, so kernels may
    /// launch nested parallel work without deadlocking.
    pub fn run<R: Send, Op: FnOnce() -> R + Send>(&self, op: Op) -> R {
        if let Some(pool) = self.pool.as_ref() {
            pool.install(op)
        } else {
            op()
        }
    }

    /// Create a thread pool with a given number of threads.
    pub fn with_num_threads(num_threads: usize) -> ThreadPool {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|index| format!("kernrt-{}", index))
            .build();

        if let Err(err) = &pool {
            tracing::warn!(%err, "failed to create thread pool, running serially");
        }

        ThreadPool { pool: pool.ok() }
    }

    /// Number of worker threads, or 1 when running serially.
    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }
}

/// Return the process-wide pool used to execute kernels.
///
/// The pool is created on first use with the thread count from
/// [`parallel_config`](crate::parallel_config).
pub fn thread_pool() -> &'static ThreadPool {
    static THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();
    THREAD_POOL.get_or_init(|| ThreadPool::with_num_threads(parallel_config().num_threads))
}

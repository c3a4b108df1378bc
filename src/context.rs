//! Compute context owning the worker thread pool.
//!
//! Every bridge and bound operator receives the context explicitly;
//! nothing in the crate spins up global state behind the caller's back.

use rayon::{ThreadPool, ThreadPoolBuilder};

/// Execution context for potential evaluation and data marshalling.
pub struct ComputeContext {
    pool: ThreadPool,
}

impl ComputeContext {
    /// Create a context with the default number of worker threads.
    pub fn new() -> Self {
        Self {
            pool: ThreadPoolBuilder::new().build().unwrap(),
        }
    }

    /// Create a context with a fixed number of worker threads.
    pub fn with_threads(nthreads: usize) -> Self {
        Self {
            pool: ThreadPoolBuilder::new()
                .num_threads(nthreads)
                .build()
                .unwrap(),
        }
    }

    /// Run a closure inside this context's thread pool.
    pub(crate) fn run<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Number of worker threads.
    pub fn nthreads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Default for ComputeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_threads() {
        let ctx = ComputeContext::with_threads(2);
        assert_eq!(ctx.nthreads(), 2);
        assert_eq!(ctx.run(|| 3 + 4), 7);
    }
}

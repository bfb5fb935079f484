use crate::prelude::{SaftError, SaftResult};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Bounded rayon pool shared by the stages of one reconstruction run.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
    workers: usize,
}

impl WorkerPool {
    pub fn with_workers(workers: usize) -> SaftResult<Self> {
        if workers == 0 {
            return Err(SaftError::InvalidArgument(
                "worker pool needs at least one worker".into(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("saft-worker-{}", index))
            .build()
            .map_err(|err| SaftError::Internal(format!("building worker pool: {}", err)))?;
        Ok(Self {
            pool: Arc::new(pool),
            workers,
        })
    }

    /// Hardware parallelism of the host, at least one.
    pub fn available_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `op` inside the pool so nested rayon iterators use its threads.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Length of the contiguous chunks that split `total` items into about one
    /// chunk per worker.
    pub fn chunk_len(&self, total: usize) -> usize {
        total.div_ceil(self.workers).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_are_rejected() {
        assert!(matches!(
            WorkerPool::with_workers(0),
            Err(SaftError::InvalidArgument(_))
        ));
    }

    #[test]
    fn chunks_cover_the_index_space() {
        let pool = WorkerPool::with_workers(4).unwrap();
        assert_eq!(pool.chunk_len(10), 3);
        assert_eq!(pool.chunk_len(0), 1);
        assert_eq!(pool.install(|| rayon::current_num_threads()), 4);
    }
}

//! Parallel processing configuration and management
//!
//! This module configures the Rayon thread pool the local scheduler runs
//! graph levels on. Unlike a global pool, every scheduler owns its pool, so
//! tests and applications can run schedulers of different sizes side by side.

use crate::errors::{BlockwiseError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Worker threads; `None` lets Rayon decide
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    #[must_use]
    pub const fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that uses all available CPU cores
    #[must_use]
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    #[must_use]
    pub const fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Build a dedicated thread pool with this configuration
    ///
    /// # Errors
    ///
    /// Returns [`BlockwiseError::ThreadPool`] if Rayon cannot start the pool.
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("blockwise-{i}"));
        if let Some(num_threads) = self.num_threads {
            builder = builder.num_threads(num_threads);
        }
        let pool = builder.build().map_err(|e| {
            BlockwiseError::ThreadPool(format!(
                "Failed to initialize thread pool with {:?} threads: {e}",
                self.num_threads
            ))
        })?;
        debug!(threads = pool.current_num_threads(), "built scheduler thread pool");
        Ok(pool)
    }
}

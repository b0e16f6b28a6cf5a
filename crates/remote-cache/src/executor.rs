//! Runtime ownership for async fetches driven from synchronous code.

use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::info;

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};

/// Owns the multi-thread tokio runtime that performs upstream I/O.
///
/// Built once at start-up and passed to whatever needs to spawn fetches.
pub struct Executor {
    runtime: Runtime,
}

impl Executor {
    /// Build a runtime with the given worker thread count (tokio default when `None`).
    pub fn new(worker_threads: Option<usize>) -> CacheResult<Self> {
        let mut runtime_builder = Builder::new_multi_thread();
        runtime_builder.enable_all().thread_name("remote-cache-worker");

        if let Some(threads) = worker_threads {
            runtime_builder.worker_threads(threads.max(1));
        }

        let runtime = runtime_builder
            .build()
            .map_err(|e| CacheError::Task(format!("Failed to create Tokio runtime: {}", e)))?;

        info!(worker_threads = ?worker_threads, "Started executor runtime");

        Ok(Self { runtime })
    }

    /// Build a runtime sized from configuration.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        Self::new(config.worker_threads)
    }

    /// Handle used to spawn tasks onto this runtime.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Run a future to completion from synchronous code.
    ///
    /// Must not be called from within an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

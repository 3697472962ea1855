//! Execution routing: inline for async handlers, worker pool for sync.
//!
//! Pool presence is decided exactly once, when the server starts, from
//! an explicit configuration value: [`ExecutionRouter::new`] takes an
//! `Option<WorkerPool>` and that choice is immutable for the server's
//! running lifetime.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::common::error::HandlerError;
use crate::protocol::xmlrpc::Value;

use super::registry::{Handler, SyncHandler};

/// Bounded execution context for blocking handlers.
///
/// Admission is gated by a semaphore sized to the worker count; callers
/// beyond capacity queue on the permit. The permit is held for the
/// whole blocking call, so at most `max_workers` handlers occupy
/// blocking threads at once.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        assert!(max_workers > 0, "worker pool needs at least one worker");
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `f(params)` on the blocking pool, queueing on admission.
    async fn run(&self, f: SyncHandler, params: Vec<Value>) -> Result<Value, HandlerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| HandlerError::other("WorkerPool", "worker pool shut down"))?;
        match tokio::task::spawn_blocking(move || f(params)).await {
            Ok(result) => result,
            // A panic inside a handler surfaces here; report it instead
            // of letting it take the connection task down.
            Err(join) => Err(HandlerError::other("JoinError", join.to_string())),
        }
    }

    /// Close the admission gate. Outstanding waiters fail immediately;
    /// nothing waits for in-flight work.
    fn shutdown(&self) {
        self.permits.close();
    }
}

/// Routes handler invocations per their registration tag.
pub struct ExecutionRouter {
    pool: Option<WorkerPool>,
}

impl ExecutionRouter {
    pub fn new(pool: Option<WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    /// Invoke a handler with `params`.
    ///
    /// Async handlers always run inline and never touch the pool. Sync
    /// handlers run pooled when a pool exists; otherwise they run
    /// inline, which blocks the scheduler thread for the duration of
    /// the call. Acceptable only for small, fast handlers.
    pub async fn invoke(
        &self,
        handler: &Handler,
        params: Vec<Value>,
    ) -> Result<Value, HandlerError> {
        match handler {
            Handler::Async(f) => f(params).await,
            Handler::Sync(f) => match &self.pool {
                Some(pool) => pool.run(f.clone(), params).await,
                None => f(params),
            },
        }
    }

    /// Tear the pool down at server stop. Idempotent; a no-op without
    /// a pool.
    pub fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }
}

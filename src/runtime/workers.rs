//! Threaded-mode worker pool.
//!
//! A multi-thread tokio runtime bounded to the configured worker count. Every
//! connection gets one driver task that pumps and dispatches whenever its
//! transport signals, a payload is submitted, or its earliest deadline
//! passes. One task per connection keeps a slow callback from delaying any
//! other connection's dispatch, up to the number of workers.

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::{Builder, Runtime};

use crate::connection::{Connection, ConnectionPhase};
use crate::core::Result;

/// Worker threads driving connection dispatch.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    runtime: Option<Runtime>,
    workers: usize,
}

impl WorkerPool {
    /// Start `workers` threads named `thread_name`.
    pub fn start(workers: usize, thread_name: &str) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name(thread_name)
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drive `connection` until it is destroyed.
    pub fn spawn_driver(&self, connection: Arc<Connection>) {
        if let Some(runtime) = &self.runtime {
            runtime.spawn(drive(connection));
        }
    }

    /// Stop the workers without waiting for them.
    pub fn shutdown(mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // The last engine handle may be released from inside a callback,
        // where a blocking runtime drop would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn drive(connection: Arc<Connection>) {
    tracing::trace!(connection = %connection.handle(), "driver started");
    loop {
        connection.poll(Instant::now());
        connection.signal_progress();
        if connection.phase() == ConnectionPhase::Destroyed {
            break;
        }

        let notified = connection.notified();
        match connection.next_deadline() {
            Some(deadline) => {
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                }
            }
            None => notified.await,
        }
    }
    tracing::trace!(connection = %connection.handle(), "driver stopped");
}

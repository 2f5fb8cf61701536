use std::future::Future;
use std::time::Duration;

use anyhow::Context;

use crate::shutdown::{start_shutdown_listener, ShutdownHandle};

/// Why an execution did not run to completion
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum Interruption {
    #[display("timed out after {after:?}")]
    TimedOut { after: Duration },
    #[display("cancelled by shutdown signal")]
    Shutdown,
}

/// Runs one future at a time to completion, bounded by a timeout and the shutdown signal.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    /// Create an executor whose runtime also listens for Ctrl-C.
    pub fn new(shutdown_handle: ShutdownHandle) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("perf-gate-executor")
            .enable_all()
            .build()
            .context("Failed to create Tokio runtime")?;
        start_shutdown_listener(&runtime, shutdown_handle.clone());

        Ok(Self {
            runtime,
            shutdown_handle,
        })
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is dropped if it runs longer than `timeout` or the shutdown signal is raised,
    /// so anything it owns, such as a child process spawned with `kill_on_drop`, is cleaned up.
    pub fn execute_in_place<T>(
        &self,
        timeout: Duration,
        fut: impl Future<Output = T>,
    ) -> Result<T, Interruption> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        if shutdown_listener.should_shutdown() {
            return Err(Interruption::Shutdown);
        }

        self.runtime.block_on(async move {
            tokio::select! {
                result = tokio::time::timeout(timeout, fut) => {
                    result.map_err(|_| Interruption::TimedOut { after: timeout })
                },
                _ = shutdown_listener.wait_for_shutdown() => Err(Interruption::Shutdown),
            }
        })
    }
}

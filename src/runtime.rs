//! Tokio runtime for the `plenary` binary.
//!
//! `#[tokio::main]` drops its runtime on return, and dropping a runtime
//! waits for every blocking task. A parse detached after the ingest
//! deadline would then hold the process open. [`block_on`] shuts the
//! runtime down with a bounded grace period instead.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;

/// Longest wait for leftover blocking tasks once the command has finished.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Run `future` on a fresh multi-thread runtime, then shut the runtime
/// down without waiting more than [`SHUTDOWN_GRACE`] for blocking tasks.
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    let result = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

//! Dedicated worker for document processing.
//!
//! Loading and transforming a document runs on a fresh named thread that the
//! caller joins before returning. Each job owns its own diagnostics
//! collector, so concurrent imports never share one.

use std::any::Any;
use std::thread;

/// Name of the worker threads.
const WORKER_NAME: &str = "docbook-worker";

/// Run `job` on a dedicated thread and wait for its result.
///
/// # Errors
///
/// Returns a message when the thread cannot be started or the job panics.
pub(crate) fn run_isolated<T, F>(job: F) -> Result<T, String>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_owned())
            .spawn_scoped(scope, job)
            .map_err(|e| format!("failed to start worker thread: {e}"))?;
        handle.join().map_err(|panic| panic_message(&*panic))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_owned()
    }
}

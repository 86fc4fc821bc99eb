//! Labelled task spawning.
//!
//! Every task runs inside a `task` span named after its label, so events from
//! the worker loop, the service core and the coalescer timers can be told
//! apart in the logs.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns an async task on the current runtime.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn<F>(task: &'static str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task, "worker.spawn");
	tokio::spawn(fut.instrument(tracing::debug_span!("task", name = task)))
}

/// Spawns blocking work such as project directory walks.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn_blocking<F, R>(task: &'static str, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(task, "worker.spawn_blocking");
	let span = tracing::debug_span!("task", name = task);
	tokio::task::spawn_blocking(move || span.in_scope(f))
}

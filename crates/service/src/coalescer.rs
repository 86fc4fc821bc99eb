//! Debounced compile forwarding.
//!
//! Bursts of [`Coalescer::schedule_compile`] calls collapse into one
//! forwarded call carrying the latest sources, made once no new call has
//! arrived for the quiet period. [`Coalescer::compile_now`] bypasses the
//! timer and drops whatever was scheduled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_protocol::SourceSet;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::service::Settled;

/// Receiver of forwarded compile calls.
#[async_trait]
pub trait CompileTarget: Send + Sync + 'static {
	async fn compile(&self, sources: SourceSet) -> Result<Settled, ServiceError>;
}

struct PendingCall {
	generation: u64,
	cancel: CancellationToken,
}

#[derive(Default)]
struct Slot {
	pending: Option<PendingCall>,
	generation: u64,
}

/// Quiet-period coalescer in front of a [`CompileTarget`].
///
/// Dropping the coalescer cancels a pending call.
pub struct Coalescer {
	target: Arc<dyn CompileTarget>,
	quiet: Duration,
	slot: Arc<Mutex<Slot>>,
}

impl Coalescer {
	pub fn new(target: Arc<dyn CompileTarget>, quiet: Duration) -> Self {
		Self {
			target,
			quiet,
			slot: Arc::new(Mutex::new(Slot::default())),
		}
	}

	pub fn quiet_period(&self) -> Duration {
		self.quiet
	}

	/// Restarts the quiet-period timer with `sources` as the payload.
	///
	/// Must be called from within a tokio runtime.
	pub fn schedule_compile(&self, sources: SourceSet) {
		let cancel = CancellationToken::new();
		let generation = {
			let mut slot = self.slot.lock();
			slot.generation += 1;
			let generation = slot.generation;
			if let Some(previous) = slot.pending.replace(PendingCall {
				generation,
				cancel: cancel.clone(),
			}) {
				previous.cancel.cancel();
			}
			generation
		};

		let target = Arc::clone(&self.target);
		let slot = Arc::clone(&self.slot);
		let quiet = self.quiet;
		folio_worker::spawn("coalescer.timer", async move {
			tokio::select! {
				_ = cancel.cancelled() => return,
				_ = tokio::time::sleep(quiet) => {}
			}
			{
				let mut slot = slot.lock();
				if slot.pending.as_ref().map(|pending| pending.generation) != Some(generation) {
					return;
				}
				slot.pending = None;
			}
			tracing::debug!(generation, "coalescer.forward");
			if let Err(err) = target.compile(sources).await {
				tracing::warn!(error = %err, "coalescer.forward.failed");
			}
		});
	}

	/// Drops any pending call and forwards `sources` right away.
	pub async fn compile_now(&self, sources: SourceSet) -> Result<Settled, ServiceError> {
		if self.cancel() {
			tracing::debug!("coalescer.bypass");
		}
		self.target.compile(sources).await
	}

	/// Drops the pending call without forwarding it. Returns `true` if one
	/// was pending.
	pub fn cancel(&self) -> bool {
		match self.slot.lock().pending.take() {
			Some(pending) => {
				pending.cancel.cancel();
				true
			}
			None => false,
		}
	}

	pub fn is_pending(&self) -> bool {
		self.slot.lock().pending.is_some()
	}
}

impl Drop for Coalescer {
	fn drop(&mut self) {
		self.cancel();
	}
}

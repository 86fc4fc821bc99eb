//! Supervised compile worker.
//!
//! A supervisor task owns one worker loop at a time. The loop pops requests
//! from the FIFO queue and runs them to completion, one by one, against the
//! [`TierManager`] it owns. Every request produces exactly one
//! [`WorkerOutbound::CompileResult`]: engine and tier errors become failures
//! inside the loop, and if the loop itself dies (panic, cancellation) the
//! supervisor posts the failure for the request that was in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use folio_protocol::{CompileRequest, CompileResult, RequestId, ResourceTier, WorkerInbound, WorkerOutbound};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::queue::{JobQueue, JobReceiver, JobSender};
use crate::{AssetLoader, BundlePlan, EngineBuilder, EngineInput, SubmitError, TierManager, join_error_panic_message, mount_overlays, virtual_path};

mod join_ctrl;

use join_ctrl::WorkerJoinCtrl;

const STOPPED: &str = "compile worker stopped";

/// Receiving end of the worker's result stream.
pub type ResultReceiver = mpsc::UnboundedReceiver<WorkerOutbound>;

/// Restart policy applied when the worker loop crashes.
#[derive(Debug, Clone)]
pub enum RestartPolicy {
	Never,
	OnFailure { max_restarts: usize, backoff: Duration },
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self::OnFailure {
			max_restarts: 3,
			backoff: Duration::from_millis(50),
		}
	}
}

impl RestartPolicy {
	fn restart_delay(&self, exit: &WorkerExit, restart_count: usize) -> Option<Duration> {
		match self {
			Self::Never => None,
			Self::OnFailure { max_restarts, backoff } => {
				if exit.is_failure() && restart_count < *max_restarts {
					Some(*backoff)
				} else {
					None
				}
			}
		}
	}
}

/// Worker construction parameters.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
	pub queue_capacity: usize,
	pub restart: RestartPolicy,
	pub plan: BundlePlan,
}

impl Default for WorkerSpec {
	fn default() -> Self {
		Self {
			queue_capacity: 64,
			restart: RestartPolicy::default(),
			plan: BundlePlan::default(),
		}
	}
}

/// Shutdown mode for the worker.
#[derive(Debug, Clone, Copy)]
pub enum ShutdownMode {
	/// Cancel the running request and fail everything queued.
	Immediate,
	/// Close the queue and let queued requests finish within `timeout`.
	Graceful { timeout: Duration },
}

/// Outcome of a shutdown call.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownReport {
	completed: bool,
	timed_out: bool,
}

impl ShutdownReport {
	pub fn completed(&self) -> bool {
		self.completed
	}

	pub fn timed_out(&self) -> bool {
		self.timed_out
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerExit {
	/// Queue closed and empty.
	Drained,
	Cancelled,
	Panicked(String),
}

impl WorkerExit {
	fn is_failure(&self) -> bool {
		matches!(self, Self::Panicked(_))
	}

	/// Error posted for the request the loop was running when it exited.
	fn abort_message(&self) -> String {
		match self {
			Self::Panicked(msg) => format!("compile worker crashed: {msg}"),
			Self::Drained | Self::Cancelled => STOPPED.to_string(),
		}
	}
}

#[derive(Default)]
struct WorkerState {
	generation: AtomicU64,
	restarts: AtomicUsize,
	in_flight: Mutex<Option<RequestId>>,
}

/// Handle to the compile worker.
///
/// Dropping the handle cancels the worker; in-flight and queued requests are
/// failed with `"compile worker stopped"`.
pub struct CompileWorker {
	tx: JobSender<WorkerInbound>,
	cancel: CancellationToken,
	state: Arc<WorkerState>,
	join_ctrl: Arc<WorkerJoinCtrl>,
}

impl Drop for CompileWorker {
	fn drop(&mut self) {
		self.cancel.cancel();
		self.tx.close_now();
	}
}

impl CompileWorker {
	/// Spawns the worker and returns its handle plus the result stream.
	///
	/// # Panics
	///
	/// Panics if `spec.queue_capacity` is zero.
	pub fn spawn(spec: WorkerSpec, loader: Arc<dyn AssetLoader>, builder: Arc<dyn EngineBuilder>) -> (Self, ResultReceiver) {
		let queue = JobQueue::new(spec.queue_capacity);
		let (results, results_rx) = mpsc::unbounded_channel();
		let cancel = CancellationToken::new();
		let state = Arc::new(WorkerState::default());

		let supervisor = Supervisor {
			rx: queue.receiver(),
			results,
			state: Arc::clone(&state),
			cancel: cancel.clone(),
			loader,
			builder,
			plan: Arc::new(spec.plan),
			restart: spec.restart,
		};
		let task = crate::spawn("compile-worker.supervisor", supervisor.run());

		let worker = Self {
			tx: queue.sender(),
			cancel,
			state,
			join_ctrl: Arc::new(WorkerJoinCtrl::new(task)),
		};
		(worker, results_rx)
	}

	/// Enqueues one message, waiting for queue capacity.
	pub async fn post(&self, msg: WorkerInbound) -> Result<(), SubmitError> {
		self.tx.send(msg).await?;
		Ok(())
	}

	/// Enqueues one compile request, waiting for queue capacity.
	pub async fn submit(&self, request: CompileRequest) -> Result<(), SubmitError> {
		tracing::debug!(id = %request.id, "worker.submit");
		self.post(WorkerInbound::Compile(request)).await
	}

	/// Enqueues one compile request, failing with `Full` instead of waiting.
	pub async fn try_submit(&self, request: CompileRequest) -> Result<(), SubmitError> {
		self.tx.try_send(WorkerInbound::Compile(request)).await?;
		Ok(())
	}

	/// Number of requests waiting behind the running one.
	pub async fn pending(&self) -> usize {
		self.tx.len().await
	}

	/// Id of the request being compiled right now.
	pub fn in_flight(&self) -> Option<RequestId> {
		*self.state.in_flight.lock()
	}

	/// Current worker loop generation, starting at 1.
	pub fn generation(&self) -> u64 {
		self.state.generation.load(Ordering::Acquire)
	}

	/// Number of crash restarts so far.
	pub fn restart_count(&self) -> usize {
		self.state.restarts.load(Ordering::Acquire)
	}

	/// Requests cancellation and closes the queue without waiting.
	pub fn cancel(&self) {
		self.cancel.cancel();
		self.tx.close_now();
	}

	/// Shuts the worker down.
	pub async fn shutdown(&self, mode: ShutdownMode) -> ShutdownReport {
		match mode {
			ShutdownMode::Immediate => {
				self.cancel.cancel();
				self.tx.close().await;
				self.join_ctrl.join().await;
				ShutdownReport {
					completed: true,
					timed_out: false,
				}
			}
			ShutdownMode::Graceful { timeout } => {
				self.tx.close().await;
				let completed = self.join_ctrl.join_with_timeout(timeout).await;
				if !completed {
					self.cancel.cancel();
				}
				ShutdownReport {
					completed,
					timed_out: !completed,
				}
			}
		}
	}

	/// Tries a graceful shutdown first and forces an immediate one on timeout.
	pub async fn shutdown_graceful_or_force(&self, timeout: Duration) -> ShutdownReport {
		let report = self.shutdown(ShutdownMode::Graceful { timeout }).await;
		if report.timed_out() {
			tracing::warn!(?timeout, "graceful worker shutdown timed out; forcing immediate");
			return self.shutdown(ShutdownMode::Immediate).await;
		}
		report
	}
}

struct Supervisor {
	rx: JobReceiver<WorkerInbound>,
	results: mpsc::UnboundedSender<WorkerOutbound>,
	state: Arc<WorkerState>,
	cancel: CancellationToken,
	loader: Arc<dyn AssetLoader>,
	builder: Arc<dyn EngineBuilder>,
	plan: Arc<BundlePlan>,
	restart: RestartPolicy,
}

impl Supervisor {
	async fn run(self) {
		let mut restarts = 0usize;
		loop {
			if self.cancel.is_cancelled() {
				break;
			}

			let generation = self.state.generation.fetch_add(1, Ordering::AcqRel) + 1;
			let tiers = TierManager::new(Arc::clone(&self.loader), Arc::clone(&self.builder), Arc::clone(&self.plan));
			let child = crate::spawn(
				"compile-worker.loop",
				run_worker_loop(tiers, self.rx.clone(), self.results.clone(), Arc::clone(&self.state), self.cancel.child_token()),
			);
			let exit = match child.await {
				Ok(exit) => exit,
				Err(err) => match join_error_panic_message(err) {
					Some(msg) => WorkerExit::Panicked(msg),
					None => WorkerExit::Cancelled,
				},
			};

			tracing::debug!(generation, restarts, exit = ?exit, "worker.exit");

			let aborted = self.state.in_flight.lock().take();
			if let Some(id) = aborted {
				let error = exit.abort_message();
				tracing::warn!(id = %id, %error, "worker.job.aborted");
				self.post(CompileResult::failure(id, error, Vec::new()));
			}

			if self.cancel.is_cancelled() {
				break;
			}

			let Some(backoff) = self.restart.restart_delay(&exit, restarts) else {
				break;
			};

			restarts += 1;
			self.state.restarts.store(restarts, Ordering::Release);
			if backoff > Duration::ZERO {
				tokio::select! {
					_ = self.cancel.cancelled() => break,
					_ = tokio::time::sleep(backoff) => {}
				}
			}
		}

		for msg in self.rx.close_and_drain().await {
			let WorkerInbound::Compile(request) = msg;
			self.post(CompileResult::failure(request.id, STOPPED, Vec::new()));
		}
		tracing::debug!(restarts, "worker.supervisor.exit");
	}

	fn post(&self, result: CompileResult) {
		if self.results.send(WorkerOutbound::CompileResult(result)).is_err() {
			tracing::debug!("worker.results.closed");
		}
	}
}

async fn run_worker_loop(
	mut tiers: TierManager,
	rx: JobReceiver<WorkerInbound>,
	results: mpsc::UnboundedSender<WorkerOutbound>,
	state: Arc<WorkerState>,
	token: CancellationToken,
) -> WorkerExit {
	loop {
		let msg = tokio::select! {
			biased;
			_ = token.cancelled() => return WorkerExit::Cancelled,
			msg = rx.recv() => match msg {
				Some(msg) => msg,
				None => return WorkerExit::Drained,
			},
		};
		let WorkerInbound::Compile(request) = msg;

		*state.in_flight.lock() = Some(request.id);
		let result = tokio::select! {
			biased;
			_ = token.cancelled() => return WorkerExit::Cancelled,
			result = compile_one(&mut tiers, request) => result,
		};
		state.in_flight.lock().take();

		if results.send(WorkerOutbound::CompileResult(result)).is_err() {
			tracing::debug!("worker.results.closed");
		}
	}
}

async fn compile_one(tiers: &mut TierManager, request: CompileRequest) -> CompileResult {
	let CompileRequest {
		id,
		main_path,
		main_source,
		shadow_files,
	} = request;
	let required = ResourceTier::detect(&main_source);
	let started = Instant::now();
	tracing::debug!(id = %id, required = %required, shadows = shadow_files.len(), "worker.job.start");

	let engine = match tiers.ensure_tier(required).await {
		Ok(engine) => engine,
		Err(err) => {
			tracing::warn!(id = %id, error = %err, "worker.tier.failed");
			return CompileResult::failure(id, err.to_string(), Vec::new());
		}
	};

	let main_path = virtual_path(&main_path);
	let overlays = mount_overlays(shadow_files, &main_path);
	let input = EngineInput {
		main_path: &main_path,
		main_source: &main_source,
		overlays: &overlays,
	};
	let result = match engine.compile(input).await {
		Ok(output) => CompileResult::success(id, output.artifact, output.diagnostics),
		Err(failure) => {
			let (error, diagnostics) = failure.into_parts();
			CompileResult::failure(id, error, diagnostics)
		}
	};

	tracing::debug!(
		id = %id,
		ok = result.is_success(),
		diagnostics = result.diagnostics().len(),
		elapsed_ms = started.elapsed().as_millis() as u64,
		"worker.job.done"
	);
	result
}

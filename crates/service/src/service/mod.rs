//! Compile service core.
//!
//! One task owns the status, the current request id and the pending waiters.
//! [`CompileService`] handles talk to it over a command channel and read the
//! published [`Snapshot`] through a watch channel. Results from the worker
//! are matched against the current id; anything else is stale.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use folio_protocol::{CompileFailure, CompileResult, CompileStatus, RequestId, RequestIdGen, SourceSet, WorkerOutbound};
use folio_worker::{AssetLoader, CompileWorker, EngineBuilder, ResultReceiver, ShutdownMode, SubmitError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::coalescer::CompileTarget;
use crate::config::CompileConfig;
use crate::error::ServiceError;
use crate::listener::{CompileListener, ListenerGuard, ListenerRegistry, SharedRegistry};

/// How a compile call settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
	/// The request's result became the current outcome.
	Applied,
	/// A newer request was dispatched first; the result was dropped.
	Superseded,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
	status: CompileStatus,
	artifact: Option<Bytes>,
	compiled: bool,
}

type Reply = oneshot::Sender<Result<Settled, ServiceError>>;

enum Command {
	Compile { sources: SourceSet, reply: Reply },
	Dispose { done: oneshot::Sender<()> },
}

/// Caller-facing compile service.
///
/// Dropping the handle disposes the service.
pub struct CompileService {
	commands: mpsc::UnboundedSender<Command>,
	state: watch::Receiver<Snapshot>,
	listeners: SharedRegistry,
	cancel: CancellationToken,
}

impl Drop for CompileService {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl CompileService {
	/// Spawns the worker and the service task on the current runtime.
	pub fn spawn(config: &CompileConfig, loader: Arc<dyn AssetLoader>, builder: Arc<dyn EngineBuilder>) -> Self {
		let (worker, results) = CompileWorker::spawn(config.worker_spec(), loader, builder);
		Self::start(worker, results, config)
	}

	/// Runs the service task over an already spawned worker and its result
	/// stream.
	fn start(worker: CompileWorker, results: ResultReceiver, config: &CompileConfig) -> Self {
		let (commands, commands_rx) = mpsc::unbounded_channel();
		let (state_tx, state) = watch::channel(Snapshot::default());
		let listeners = SharedRegistry::default();
		let cancel = CancellationToken::new();

		let core = ServiceCore {
			worker,
			results,
			results_open: true,
			ids: RequestIdGen::new(),
			current: None,
			pending: HashMap::new(),
			state: state_tx,
			listeners: Arc::clone(&listeners),
			reply_timeout: config.reply_timeout(),
			shutdown_timeout: config.shutdown_timeout(),
		};
		folio_worker::spawn("compile-service.core", core.run(commands_rx, cancel.clone()));

		Self {
			commands,
			state,
			listeners,
			cancel,
		}
	}

	/// Dispatches a compile of `sources`, superseding any in-flight request.
	///
	/// Resolves once the request settles. A missing or non-UTF-8 main file is
	/// rejected before dispatch and leaves the status untouched.
	pub async fn compile(&self, sources: SourceSet) -> Result<Settled, ServiceError> {
		let (reply, rx) = oneshot::channel();
		self.commands
			.send(Command::Compile { sources, reply })
			.map_err(|_| ServiceError::Disposed)?;
		rx.await.unwrap_or(Err(ServiceError::Disposed))
	}

	/// Registers a listener; the returned guard removes it.
	pub fn add_listener(&self, listener: Arc<dyn CompileListener>) -> ListenerGuard {
		ListenerRegistry::insert(&self.listeners, listener)
	}

	pub fn status(&self) -> CompileStatus {
		self.state.borrow().status
	}

	/// Artifact of the most recent successful compile.
	pub fn last_artifact(&self) -> Option<Bytes> {
		self.state.borrow().artifact.clone()
	}

	/// `true` once any request has settled as the current outcome.
	pub fn has_compiled(&self) -> bool {
		self.state.borrow().compiled
	}

	/// Fails pending calls, stops the worker and releases the artifact.
	///
	/// Idempotent; later compile calls fail with [`ServiceError::Disposed`].
	pub async fn dispose(&self) {
		let (done, rx) = oneshot::channel();
		if self.commands.send(Command::Dispose { done }).is_ok() {
			let _ = rx.await;
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.commands.is_closed()
	}
}

#[async_trait]
impl CompileTarget for CompileService {
	async fn compile(&self, sources: SourceSet) -> Result<Settled, ServiceError> {
		CompileService::compile(self, sources).await
	}
}

struct Pending {
	reply: Reply,
	deadline: Option<Instant>,
}

struct ServiceCore {
	worker: CompileWorker,
	results: ResultReceiver,
	results_open: bool,
	ids: RequestIdGen,
	current: Option<RequestId>,
	pending: HashMap<RequestId, Pending>,
	state: watch::Sender<Snapshot>,
	listeners: SharedRegistry,
	reply_timeout: Option<Duration>,
	shutdown_timeout: Duration,
}

impl ServiceCore {
	async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
		loop {
			let deadline = self.next_deadline();
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				cmd = commands.recv() => match cmd {
					Some(Command::Compile { sources, reply }) => self.dispatch(sources, reply).await,
					Some(Command::Dispose { done }) => {
						commands.close();
						self.dispose().await;
						let _ = done.send(());
						return;
					}
					None => break,
				},
				msg = self.results.recv(), if self.results_open => match msg {
					Some(WorkerOutbound::CompileResult(result)) => self.settle(result),
					None => self.worker_exited(),
				},
				_ = sleep_until(deadline) => self.expire(),
			}
		}
		commands.close();
		self.dispose().await;
	}

	async fn dispatch(&mut self, sources: SourceSet, reply: Reply) {
		let id = self.ids.next();
		let request = match sources.into_request(id) {
			Ok(request) => request,
			Err(err) => {
				tracing::debug!(error = %err, "service.compile.rejected");
				let _ = reply.send(Err(err.into()));
				return;
			}
		};

		if let Some(previous) = self.current.replace(id) {
			tracing::debug!(id = %id, superseded = %previous, "service.dispatch.supersede");
		}
		let deadline = self.reply_timeout.map(|timeout| Instant::now() + timeout);
		self.pending.insert(id, Pending { reply, deadline });
		self.set_status(CompileStatus::Compiling);

		tracing::debug!(id = %id, shadows = request.shadow_files.len(), "service.dispatch");
		// Never wait for queue space here: timeouts, results and disposal are
		// all handled by this loop.
		if let Err(err) = self.worker.try_submit(request).await {
			tracing::warn!(id = %id, error = %err, "service.dispatch.failed");
			let err = match err {
				SubmitError::Full => ServiceError::QueueFull,
				SubmitError::Closed => ServiceError::WorkerExited,
			};
			self.fail_transport(id, err);
		}
	}

	fn settle(&mut self, result: CompileResult) {
		let id = result.id();
		let pending = self.pending.remove(&id);

		if self.current != Some(id) {
			tracing::debug!(id = %id, current = ?self.current, "service.result.stale");
			if let Some(pending) = pending {
				let _ = pending.reply.send(Ok(Settled::Superseded));
			}
			return;
		}
		self.current = None;

		match result {
			CompileResult::Success(success) => {
				tracing::debug!(
					id = %id,
					bytes = success.artifact.len(),
					diagnostics = success.diagnostics.len(),
					"service.result.done"
				);
				self.state.send_modify(|snapshot| {
					snapshot.artifact = Some(success.artifact.clone());
					snapshot.compiled = true;
				});
				self.set_status(CompileStatus::Done);
				self.each_listener(|listener| listener.on_success(&success));
			}
			CompileResult::Failure(failure) => {
				tracing::debug!(id = %id, error = %failure.error, "service.result.error");
				self.state.send_modify(|snapshot| snapshot.compiled = true);
				self.set_status(CompileStatus::Error);
				self.each_listener(|listener| listener.on_error(&failure));
			}
		}

		if let Some(pending) = pending {
			let _ = pending.reply.send(Ok(Settled::Applied));
		}
	}

	/// Fails `id` with a transport error; listeners hear about it only if it
	/// is still current.
	fn fail_transport(&mut self, id: RequestId, err: ServiceError) {
		let pending = self.pending.remove(&id);
		if self.current == Some(id) {
			self.current = None;
			let failure = CompileFailure {
				id,
				error: err.to_string(),
				diagnostics: Vec::new(),
			};
			self.state.send_modify(|snapshot| snapshot.compiled = true);
			self.set_status(CompileStatus::Error);
			self.each_listener(|listener| listener.on_error(&failure));
		}
		if let Some(pending) = pending {
			let _ = pending.reply.send(Err(err));
		}
	}

	fn expire(&mut self) {
		let Some(timeout) = self.reply_timeout else {
			return;
		};
		let now = Instant::now();
		let expired: Vec<RequestId> = self
			.pending
			.iter()
			.filter(|(_, pending)| pending.deadline.is_some_and(|deadline| deadline <= now))
			.map(|(id, _)| *id)
			.collect();
		for id in expired {
			tracing::warn!(id = %id, ?timeout, "service.reply.timeout");
			self.fail_transport(id, ServiceError::Timeout(timeout));
		}
	}

	fn worker_exited(&mut self) {
		self.results_open = false;
		tracing::warn!(pending = self.pending.len(), "service.worker.exited");
		let mut ids: Vec<RequestId> = self.pending.keys().copied().collect();
		ids.sort_unstable();
		for id in ids {
			self.fail_transport(id, ServiceError::WorkerExited);
		}
	}

	async fn dispose(&mut self) {
		self.current = None;
		for (_, pending) in self.pending.drain() {
			let _ = pending.reply.send(Err(ServiceError::Disposed));
		}
		if tokio::time::timeout(self.shutdown_timeout, self.worker.shutdown(ShutdownMode::Immediate))
			.await
			.is_err()
		{
			tracing::warn!(timeout = ?self.shutdown_timeout, "service.worker.shutdown_timeout");
		}
		self.state.send_modify(|snapshot| snapshot.artifact = None);
		tracing::debug!("service.disposed");
	}

	fn next_deadline(&self) -> Option<Instant> {
		self.pending.values().filter_map(|pending| pending.deadline).min()
	}

	fn set_status(&self, status: CompileStatus) {
		let changed = self.state.send_if_modified(|snapshot| {
			if snapshot.status == status {
				return false;
			}
			snapshot.status = status;
			true
		});
		if changed {
			tracing::trace!(%status, "service.status");
			self.each_listener(|listener| listener.on_status_change(status));
		}
	}

	fn each_listener(&self, f: impl Fn(&dyn CompileListener)) {
		let listeners = self.listeners.lock().snapshot();
		for listener in &listeners {
			f(listener.as_ref());
		}
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

//! `compile` and `watch` commands.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use folio_protocol::{CompileFailure, CompileSuccess};
use folio_service::{Coalescer, CompileConfig, CompileListener, CompileService, ServiceError, Settled};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::ProjectArgs;
use crate::engine::TypstBuilder;
use crate::loader::BundleLoader;
use crate::project::Project;

#[derive(Debug)]
enum Outcome {
	Success(CompileSuccess),
	Failure(CompileFailure),
}

/// Forwards outcomes off the service task.
struct OutcomeListener {
	tx: mpsc::UnboundedSender<Outcome>,
}

impl CompileListener for OutcomeListener {
	fn on_success(&self, success: &CompileSuccess) {
		let _ = self.tx.send(Outcome::Success(success.clone()));
	}

	fn on_error(&self, failure: &CompileFailure) {
		let _ = self.tx.send(Outcome::Failure(failure.clone()));
	}
}

struct Session {
	project: Project,
	service: Arc<CompileService>,
	coalescer: Coalescer,
	outcomes: mpsc::UnboundedReceiver<Outcome>,
	_listener: folio_service::ListenerGuard,
}

impl Session {
	fn start(args: &ProjectArgs) -> Result<Self> {
		let config = CompileConfig::load_or_default(args.config.as_deref())?;
		let project = Project::resolve(&args.main, args.root.as_deref(), args.output.as_deref())?;
		let loader = BundleLoader::new(BundleLoader::default_cache_dir()).context("creating HTTP client")?;
		let builder = TypstBuilder::new(args.typst.clone());

		let service = Arc::new(CompileService::spawn(&config, Arc::new(loader), Arc::new(builder)));
		let (tx, outcomes) = mpsc::unbounded_channel();
		let listener = service.add_listener(Arc::new(OutcomeListener { tx }));
		let coalescer = Coalescer::new(service.clone(), config.debounce());

		tracing::debug!(root = %project.root().display(), output = %project.output().display(), "session.start");
		Ok(Self {
			project,
			service,
			coalescer,
			outcomes,
			_listener: listener,
		})
	}

	/// Writes a successful artifact and prints diagnostics. Returns whether
	/// the outcome was a success.
	async fn report(&self, outcome: Outcome) -> Result<bool> {
		match outcome {
			Outcome::Success(success) => {
				for diagnostic in &success.diagnostics {
					eprintln!("{diagnostic}");
				}
				let output = self.project.output();
				if let Some(parent) = output.parent() {
					tokio::fs::create_dir_all(parent).await?;
				}
				tokio::fs::write(output, &success.artifact)
					.await
					.with_context(|| format!("writing {}", output.display()))?;
				tracing::info!(output = %output.display(), bytes = success.artifact.len(), "document written");
				Ok(true)
			}
			Outcome::Failure(failure) => {
				for diagnostic in &failure.diagnostics {
					eprintln!("{diagnostic}");
				}
				if !failure.diagnostics.contains(&failure.error) {
					eprintln!("error: {}", failure.error);
				}
				Ok(false)
			}
		}
	}

	/// Loads the project, compiles it right away and reports the outcome.
	async fn compile_once(&mut self) -> Result<bool> {
		let sources = self.project.load().await?;
		let settled = self.coalescer.compile_now(sources).await;
		let outcome = applied_outcome(settled, self.outcomes.try_recv().ok())?;
		self.report(outcome).await
	}

	async fn close(self) {
		self.coalescer.cancel();
		self.service.dispose().await;
	}
}

/// The outcome a listener saw for an applied compile.
fn applied_outcome(settled: Result<Settled, ServiceError>, outcome: Option<Outcome>) -> Result<Outcome> {
	match (settled?, outcome) {
		(Settled::Applied, Some(outcome)) => Ok(outcome),
		(settled, _) => bail!("compile settled as {settled:?} without an outcome"),
	}
}

pub(crate) async fn compile(args: ProjectArgs) -> Result<()> {
	let mut session = Session::start(&args)?;
	let reported = session.compile_once().await;
	session.close().await;
	if !reported? {
		bail!("compilation failed");
	}
	Ok(())
}

pub(crate) async fn watch(args: ProjectArgs) -> Result<()> {
	let mut session = Session::start(&args)?;

	let (changes_tx, mut changes) = mpsc::unbounded_channel();
	let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
		Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) => {
			let _ = changes_tx.send(event.paths);
		}
		Ok(_) => {}
		Err(err) => tracing::warn!(error = %err, "watch.error"),
	})?;
	watcher.watch(session.project.root(), RecursiveMode::Recursive)?;

	match session.project.load().await {
		Ok(sources) => {
			if let Err(err) = session.coalescer.compile_now(sources).await {
				tracing::warn!(error = %err, "initial compile failed");
			}
		}
		Err(err) => tracing::warn!(error = %err, "loading project failed"),
	}

	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);
	loop {
		tokio::select! {
			_ = &mut ctrl_c => break,
			Some(paths) = changes.recv() => {
				if !paths.iter().any(|path| session.project.is_source_change(path)) {
					continue;
				}
				match session.project.load().await {
					Ok(sources) => session.coalescer.schedule_compile(sources),
					Err(err) => tracing::warn!(error = %err, "loading project failed"),
				}
			}
			Some(outcome) = session.outcomes.recv() => {
				if let Err(err) = session.report(outcome).await {
					tracing::warn!(error = %err, "writing document failed");
				}
			}
		}
	}

	tracing::info!("stopping");
	drop(watcher);
	session.close().await;
	Ok(())
}

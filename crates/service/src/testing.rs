//! Fakes shared by the service tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use folio_protocol::{CompileFailure, CompileStatus, CompileSuccess, RequestId, ResourceTier, SourceSet};
use folio_worker::{AssetBundle, AssetError, AssetLoader, BuildError, BundlePlan, EngineBuilder, EngineFailure, EngineHandle, EngineInput, EngineOutput, TypesetEngine};
use parking_lot::Mutex;

use crate::{CompileConfig, CompileListener, CompileService};

pub(crate) struct StubLoader;

#[async_trait]
impl AssetLoader for StubLoader {
	async fn load(&self, bundle: &str) -> Result<AssetBundle, AssetError> {
		Ok(AssetBundle {
			id: bundle.to_string(),
			files: Vec::new(),
		})
	}
}

pub(crate) struct StubBuilder;

#[async_trait]
impl EngineBuilder for StubBuilder {
	async fn build(&self, _tier: ResourceTier, _bundles: Vec<AssetBundle>) -> Result<EngineHandle, BuildError> {
		Ok(Box::new(StubEngine))
	}
}

/// `hang` sleeps for ten minutes, `slow` for 50 ms, `fail` fails and
/// `warn` succeeds with a warning.
struct StubEngine;

#[async_trait]
impl TypesetEngine for StubEngine {
	async fn compile(&mut self, input: EngineInput<'_>) -> Result<EngineOutput, EngineFailure> {
		let source = input.main_source;
		if source.contains("hang") {
			tokio::time::sleep(Duration::from_secs(600)).await;
		} else if source.contains("slow") {
			tokio::time::sleep(Duration::from_millis(50)).await;
		}
		if source.contains("fail") {
			return Err(EngineFailure::new("compilation failed", vec!["main.typ:1:2: error: unknown variable: x".to_string()]));
		}
		let diagnostics = if source.contains("warn") {
			vec!["main.typ:1:1: warning: unused variable".to_string()]
		} else {
			Vec::new()
		};
		Ok(EngineOutput {
			artifact: Bytes::from(format!("%PDF-1.7 {source}")),
			diagnostics,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
	Status(CompileStatus),
	Success(RequestId),
	Error(RequestId, String),
}

#[derive(Default)]
pub(crate) struct Recorder {
	events: Mutex<Vec<Event>>,
	successes: Mutex<Vec<CompileSuccess>>,
}

impl Recorder {
	pub(crate) fn events(&self) -> Vec<Event> {
		self.events.lock().clone()
	}

	pub(crate) fn artifacts(&self) -> Vec<Bytes> {
		self.successes.lock().iter().map(|success| success.artifact.clone()).collect()
	}

	/// Successes exactly as listeners received them.
	pub(crate) fn successes(&self) -> Vec<CompileSuccess> {
		self.successes.lock().clone()
	}
}

impl CompileListener for Recorder {
	fn on_status_change(&self, status: CompileStatus) {
		self.events.lock().push(Event::Status(status));
	}

	fn on_success(&self, success: &CompileSuccess) {
		self.events.lock().push(Event::Success(success.id));
		self.successes.lock().push(success.clone());
	}

	fn on_error(&self, failure: &CompileFailure) {
		self.events.lock().push(Event::Error(failure.id, failure.error.clone()));
	}
}

pub(crate) fn test_config() -> CompileConfig {
	let mut config = CompileConfig::default();
	config.bundles = BundlePlan {
		core: vec!["core".into()],
		cjk: vec!["cjk".into()],
		emoji: vec!["emoji".into()],
	};
	config
}

pub(crate) fn spawn_service(config: &CompileConfig) -> CompileService {
	CompileService::spawn(config, Arc::new(StubLoader), Arc::new(StubBuilder))
}

pub(crate) fn sources(text: &str) -> SourceSet {
	SourceSet::new("main.typ").with_file("main.typ", text.to_string())
}

//! Fakes for the collaborator seams.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use folio_protocol::ResourceTier;
use parking_lot::Mutex;

use crate::{AssetBundle, AssetError, AssetFile, AssetLoader, BuildError, BundlePlan, EngineBuilder, EngineFailure, EngineHandle, EngineInput, EngineOutput, TypesetEngine};

pub(crate) fn test_plan() -> BundlePlan {
	BundlePlan {
		core: vec!["core".into()],
		cjk: vec!["cjk".into()],
		emoji: vec!["emoji".into()],
	}
}

#[derive(Default)]
struct LoaderState {
	loaded: Vec<String>,
	failing: HashSet<String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeLoader {
	state: Arc<Mutex<LoaderState>>,
}

impl FakeLoader {
	pub(crate) fn fail(&self, id: &str) {
		self.state.lock().failing.insert(id.to_string());
	}

	pub(crate) fn heal(&self, id: &str) {
		self.state.lock().failing.remove(id);
	}

	pub(crate) fn loaded(&self) -> Vec<String> {
		self.state.lock().loaded.clone()
	}
}

#[async_trait]
impl AssetLoader for FakeLoader {
	async fn load(&self, bundle: &str) -> Result<AssetBundle, AssetError> {
		let mut state = self.state.lock();
		if state.failing.contains(bundle) {
			return Err(AssetError::Fetch {
				bundle: bundle.to_string(),
				reason: "offline".to_string(),
			});
		}
		state.loaded.push(bundle.to_string());
		Ok(AssetBundle {
			id: bundle.to_string(),
			files: vec![AssetFile {
				name: format!("{bundle}.ttf"),
				data: Bytes::new(),
			}],
		})
	}
}

/// Shared observation point for every engine a [`FakeBuilder`] creates.
#[derive(Clone, Default)]
pub(crate) struct EngineRecorder {
	active: Arc<AtomicUsize>,
	peak: Arc<AtomicUsize>,
	seen: Arc<Mutex<Vec<String>>>,
	overlays: Arc<Mutex<Vec<Vec<String>>>>,
	mains: Arc<Mutex<Vec<String>>>,
}

impl EngineRecorder {
	/// Highest number of overlapping engine calls observed.
	pub(crate) fn peak(&self) -> usize {
		self.peak.load(Ordering::SeqCst)
	}

	/// Main sources in invocation order.
	pub(crate) fn seen(&self) -> Vec<String> {
		self.seen.lock().clone()
	}

	pub(crate) fn overlays(&self) -> Vec<Vec<String>> {
		self.overlays.lock().clone()
	}

	/// Virtual main paths in invocation order.
	pub(crate) fn mains(&self) -> Vec<String> {
		self.mains.lock().clone()
	}
}

#[derive(Default)]
struct BuilderState {
	tiers: Vec<ResourceTier>,
	fail_next: bool,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBuilder {
	state: Arc<Mutex<BuilderState>>,
	recorder: EngineRecorder,
}

impl FakeBuilder {
	pub(crate) fn builds(&self) -> usize {
		self.state.lock().tiers.len()
	}

	pub(crate) fn tiers(&self) -> Vec<ResourceTier> {
		self.state.lock().tiers.clone()
	}

	pub(crate) fn fail_next(&self) {
		self.state.lock().fail_next = true;
	}

	pub(crate) fn recorder(&self) -> EngineRecorder {
		self.recorder.clone()
	}
}

#[async_trait]
impl EngineBuilder for FakeBuilder {
	async fn build(&self, tier: ResourceTier, _bundles: Vec<AssetBundle>) -> Result<EngineHandle, BuildError> {
		let mut state = self.state.lock();
		if state.fail_next {
			state.fail_next = false;
			return Err(BuildError("font parse error".to_string()));
		}
		state.tiers.push(tier);
		Ok(Box::new(FakeEngine { recorder: self.recorder.clone() }))
	}
}

/// Engine whose behaviour is keyed off the main source text:
/// `slow` sleeps longer, `fail` fails, `warn` adds a diagnostic, `panic` panics
/// with a message and `panic-code` with a bare integer.
struct FakeEngine {
	recorder: EngineRecorder,
}

#[async_trait]
impl TypesetEngine for FakeEngine {
	async fn compile(&mut self, input: EngineInput<'_>) -> Result<EngineOutput, EngineFailure> {
		let now = self.recorder.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.recorder.peak.fetch_max(now, Ordering::SeqCst);
		self.recorder.seen.lock().push(input.main_source.to_string());
		self.recorder.overlays.lock().push(input.overlays.keys().cloned().collect());
		self.recorder.mains.lock().push(input.main_path.to_string());

		let delay = if input.main_source.contains("slow") { 40 } else { 2 };
		tokio::time::sleep(Duration::from_millis(delay)).await;
		self.recorder.active.fetch_sub(1, Ordering::SeqCst);

		let source = input.main_source;
		if source.contains("panic-code") {
			std::panic::panic_any(7u32);
		}
		if source.contains("panic") {
			panic!("engine exploded");
		}
		if source.contains("fail") {
			return Err(EngineFailure::from_diagnostics(vec!["main.typ:1:1: error: unknown variable".to_string()]));
		}
		let diagnostics = if source.contains("warn") {
			vec!["main.typ:1:1: warning: unused".to_string()]
		} else {
			Vec::new()
		};
		Ok(EngineOutput {
			artifact: Bytes::from(format!("%PDF-{source}")),
			diagnostics,
		})
	}
}

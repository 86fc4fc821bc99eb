//! Collaborator seams: the opaque engine, the asset loader and the builder
//! that turns loaded assets into a ready engine.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use folio_protocol::{ResourceTier, ShadowFiles};

use crate::{AssetError, BuildError};

/// Shadow files keyed by absolute virtual path (`/` + relative path).
pub type Overlays = BTreeMap<String, Bytes>;

/// Absolute virtual path of a project-relative path.
pub fn virtual_path(relative: &str) -> String {
	format!("/{}", relative.trim_start_matches('/'))
}

/// Mounts request shadow files under the virtual root.
///
/// A shadow file at `main_path` would hide the main source and is dropped.
pub fn mount_overlays(shadow_files: ShadowFiles, main_path: &str) -> Overlays {
	let mut overlays: Overlays = shadow_files.into_iter().map(|(path, data)| (virtual_path(&path), data)).collect();
	if overlays.remove(main_path).is_some() {
		tracing::warn!(path = main_path, "worker.overlay.shadowed_main");
	}
	overlays
}

/// Inputs for one engine invocation. Overlays are only valid for this call.
#[derive(Debug, Clone, Copy)]
pub struct EngineInput<'a> {
	/// Absolute virtual path of the main document, e.g. `/src/main.typ`.
	pub main_path: &'a str,
	pub main_source: &'a str,
	pub overlays: &'a Overlays,
}

/// Artifact plus non-fatal diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
	pub artifact: Bytes,
	pub diagnostics: Vec<String>,
}

/// The engine could not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
	message: String,
	diagnostics: Vec<String>,
}

impl EngineFailure {
	pub fn new(message: impl Into<String>, diagnostics: Vec<String>) -> Self {
		Self {
			message: message.into(),
			diagnostics,
		}
	}

	/// Failure described only by its diagnostics.
	pub fn from_diagnostics(diagnostics: Vec<String>) -> Self {
		Self::new(String::new(), diagnostics)
	}

	/// Human-readable message; falls back to the joined diagnostics.
	pub fn message(&self) -> String {
		if !self.message.is_empty() {
			return self.message.clone();
		}
		if self.diagnostics.is_empty() {
			return "compilation failed (no diagnostics)".to_string();
		}
		self.diagnostics.join("\n")
	}

	pub fn diagnostics(&self) -> &[String] {
		&self.diagnostics
	}

	pub fn into_parts(self) -> (String, Vec<String>) {
		let message = self.message();
		(message, self.diagnostics)
	}
}

impl fmt::Display for EngineFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.message())
	}
}

impl std::error::Error for EngineFailure {}

/// Opaque typesetting engine.
///
/// Takes `&mut self`: implementations are never invoked concurrently.
#[async_trait]
pub trait TypesetEngine: Send {
	async fn compile(&mut self, input: EngineInput<'_>) -> Result<EngineOutput, EngineFailure>;
}

/// Owned engine instance held by the tier manager.
pub type EngineHandle = Box<dyn TypesetEngine>;

/// One file of an asset bundle (typically a font).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
	pub name: String,
	pub data: Bytes,
}

/// Loaded capability bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBundle {
	pub id: String,
	pub files: Vec<AssetFile>,
}

/// Fetches capability bundles by identifier (URL or path).
#[async_trait]
pub trait AssetLoader: Send + Sync {
	async fn load(&self, bundle: &str) -> Result<AssetBundle, AssetError>;
}

/// Builds a complete engine for a tier from every bundle that tier needs.
#[async_trait]
pub trait EngineBuilder: Send + Sync {
	async fn build(&self, tier: ResourceTier, bundles: Vec<AssetBundle>) -> Result<EngineHandle, BuildError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn failure_message_falls_back_to_diagnostics() {
		let failure = EngineFailure::from_diagnostics(vec!["a.typ:1:1: error: x".into(), "a.typ:2:1: error: y".into()]);
		assert_eq!(failure.message(), "a.typ:1:1: error: x\na.typ:2:1: error: y");
		assert_eq!(EngineFailure::from_diagnostics(Vec::new()).to_string(), "compilation failed (no diagnostics)");
		assert_eq!(EngineFailure::new("boom", Vec::new()).message(), "boom");
	}

	#[test]
	fn overlays_are_mounted_under_root() {
		let mut shadow = ShadowFiles::new();
		shadow.insert("img/logo.png".into(), Bytes::from_static(b"png"));
		let overlays = mount_overlays(shadow, "/main.typ");
		assert_eq!(overlays.keys().collect::<Vec<_>>(), vec!["/img/logo.png"]);
	}

	#[test]
	fn shadow_at_main_path_is_dropped() {
		let mut shadow = ShadowFiles::new();
		shadow.insert("main.typ".into(), Bytes::from_static(b"= Other"));
		shadow.insert("src/main.typ".into(), Bytes::from_static(b"= Nested"));
		let overlays = mount_overlays(shadow, &virtual_path("src/main.typ"));
		assert_eq!(overlays.keys().collect::<Vec<_>>(), vec!["/main.typ"]);
	}
}

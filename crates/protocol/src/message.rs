//! Request/result payloads and the tagged envelopes crossing the worker boundary.
//!
//! Wire shape (JSON-compatible):
//!
//! ```text
//! { "kind": "compile", "id": "7", "mainSource": "...", "shadowFiles": { "img/a.png": [..] } }
//! { "kind": "compile", "id": "8", "mainPath": "src/main.typ", "mainSource": "...", "shadowFiles": {} }
//! { "kind": "compile-result", "id": "7", "ok": true, "artifact": [..], "diagnostics": [] }
//! { "kind": "compile-result", "id": "7", "ok": false, "error": "...", "diagnostics": [..] }
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, RequestId};

/// Auxiliary inputs keyed by project-relative path.
pub type ShadowFiles = BTreeMap<String, Bytes>;

/// Project-relative path of the main document when a request names none.
pub const DEFAULT_MAIN_PATH: &str = "main.typ";

fn default_main_path() -> String {
	DEFAULT_MAIN_PATH.to_string()
}

fn is_default_main_path(path: &str) -> bool {
	path == DEFAULT_MAIN_PATH
}

/// One compilation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
	/// Correlation id echoed on the result.
	pub id: RequestId,
	/// Project-relative path the main document is mounted at. Relative
	/// imports resolve from its directory.
	#[serde(default = "default_main_path", skip_serializing_if = "is_default_main_path")]
	pub main_path: String,
	/// Text of the main document.
	pub main_source: String,
	/// Files visible to the engine for this request only.
	#[serde(default)]
	pub shadow_files: ShadowFiles,
}

impl CompileRequest {
	/// Creates a request without shadow files.
	pub fn new(id: RequestId, main_source: impl Into<String>) -> Self {
		Self {
			id,
			main_path: default_main_path(),
			main_source: main_source.into(),
			shadow_files: ShadowFiles::new(),
		}
	}

	/// Mounts the main document at `path` instead of [`DEFAULT_MAIN_PATH`].
	#[must_use]
	pub fn with_main_path(mut self, path: impl Into<String>) -> Self {
		self.main_path = path.into();
		self
	}

	/// Adds one shadow file.
	#[must_use]
	pub fn with_shadow(mut self, path: impl Into<String>, content: impl Into<Bytes>) -> Self {
		self.shadow_files.insert(path.into(), content.into());
		self
	}
}

/// Successful compilation: artifact plus non-fatal diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSuccess {
	/// Originating request.
	pub id: RequestId,
	/// Rendered document bytes.
	pub artifact: Bytes,
	/// Warnings reported alongside the artifact.
	pub diagnostics: Vec<String>,
}

/// Failed compilation: no artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
	/// Originating request.
	pub id: RequestId,
	/// Human-readable failure message.
	pub error: String,
	/// Diagnostics produced before the failure.
	pub diagnostics: Vec<String>,
}

/// Outcome of one request, always tagged with the request's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CompileResponse", try_from = "CompileResponse")]
pub enum CompileResult {
	/// The engine produced an artifact.
	Success(CompileSuccess),
	/// No artifact could be produced.
	Failure(CompileFailure),
}

impl CompileResult {
	/// Builds a success result.
	pub fn success(id: RequestId, artifact: impl Into<Bytes>, diagnostics: Vec<String>) -> Self {
		Self::Success(CompileSuccess {
			id,
			artifact: artifact.into(),
			diagnostics,
		})
	}

	/// Builds a failure result.
	pub fn failure(id: RequestId, error: impl Into<String>, diagnostics: Vec<String>) -> Self {
		Self::Failure(CompileFailure {
			id,
			error: error.into(),
			diagnostics,
		})
	}

	/// Correlation id of the originating request.
	pub fn id(&self) -> RequestId {
		match self {
			Self::Success(s) => s.id,
			Self::Failure(f) => f.id,
		}
	}

	/// Returns `true` for [`CompileResult::Success`].
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// Diagnostics attached to either outcome.
	pub fn diagnostics(&self) -> &[String] {
		match self {
			Self::Success(s) => &s.diagnostics,
			Self::Failure(f) => &f.diagnostics,
		}
	}
}

/// Flat wire view of a [`CompileResult`], discriminated by `ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CompileResponse {
	pub id: RequestId,
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub artifact: Option<Bytes>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default)]
	pub diagnostics: Vec<String>,
}

impl From<CompileResult> for CompileResponse {
	fn from(result: CompileResult) -> Self {
		match result {
			CompileResult::Success(s) => Self {
				id: s.id,
				ok: true,
				artifact: Some(s.artifact),
				error: None,
				diagnostics: s.diagnostics,
			},
			CompileResult::Failure(f) => Self {
				id: f.id,
				ok: false,
				artifact: None,
				error: Some(f.error),
				diagnostics: f.diagnostics,
			},
		}
	}
}

impl TryFrom<CompileResponse> for CompileResult {
	type Error = ProtocolError;

	fn try_from(resp: CompileResponse) -> Result<Self, Self::Error> {
		if resp.ok {
			let artifact = resp.artifact.ok_or(ProtocolError::MissingArtifact(resp.id))?;
			Ok(Self::success(resp.id, artifact, resp.diagnostics))
		} else {
			let error = resp.error.ok_or(ProtocolError::MissingError(resp.id))?;
			Ok(Self::failure(resp.id, error, resp.diagnostics))
		}
	}
}

/// Messages sent to the compile worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WorkerInbound {
	/// Compile one request.
	#[serde(rename = "compile")]
	Compile(CompileRequest),
}

/// Messages posted by the compile worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WorkerOutbound {
	/// Outcome of one request.
	#[serde(rename = "compile-result")]
	CompileResult(CompileResult),
}

impl WorkerOutbound {
	/// Correlation id carried by this message.
	pub fn id(&self) -> RequestId {
		match self {
			Self::CompileResult(result) => result.id(),
		}
	}
}

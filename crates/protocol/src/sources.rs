//! Project snapshots handed to the compile service.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{CompileRequest, ProtocolError, RequestId, ShadowFiles};

/// Snapshot of a project: file contents by relative path plus the main file.
///
/// Paths are stored without leading `/` or `./`. Turning the snapshot into a
/// [`CompileRequest`] moves the main file into `main_source` and every other
/// file into the shadow set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
	main_path: String,
	files: BTreeMap<String, Bytes>,
}

impl SourceSet {
	/// Creates an empty snapshot whose main file is `main_path`.
	pub fn new(main_path: impl AsRef<str>) -> Self {
		Self {
			main_path: normalize_path(main_path.as_ref()),
			files: BTreeMap::new(),
		}
	}

	/// Inserts or replaces one file, returning the previous content.
	pub fn insert(&mut self, path: impl AsRef<str>, content: impl Into<Bytes>) -> Option<Bytes> {
		self.files.insert(normalize_path(path.as_ref()), content.into())
	}

	/// Builder form of [`Self::insert`].
	#[must_use]
	pub fn with_file(mut self, path: impl AsRef<str>, content: impl Into<Bytes>) -> Self {
		self.insert(path, content);
		self
	}

	/// Normalized main file path.
	pub fn main_path(&self) -> &str {
		&self.main_path
	}

	/// Content of one file, if present.
	pub fn get(&self, path: &str) -> Option<&Bytes> {
		self.files.get(&normalize_path(path))
	}

	/// Number of files, main file included.
	pub fn len(&self) -> usize {
		self.files.len()
	}

	/// Returns `true` if the snapshot has no files.
	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	/// Builds the request for this snapshot.
	pub fn into_request(mut self, id: RequestId) -> Result<CompileRequest, ProtocolError> {
		let main = self.files.remove(&self.main_path).ok_or_else(|| ProtocolError::MissingMain(self.main_path.clone()))?;
		let main_source = String::from_utf8(main.to_vec()).map_err(|_| ProtocolError::InvalidMain(self.main_path.clone()))?;
		let shadow_files: ShadowFiles = self.files;
		Ok(CompileRequest {
			id,
			main_path: self.main_path,
			main_source,
			shadow_files,
		})
	}
}

fn normalize_path(path: &str) -> String {
	let mut rest = path;
	loop {
		if let Some(stripped) = rest.strip_prefix("./") {
			rest = stripped;
		} else if let Some(stripped) = rest.strip_prefix('/') {
			rest = stripped;
		} else {
			return rest.to_owned();
		}
	}
}

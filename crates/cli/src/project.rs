//! Project directory snapshots.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use folio_protocol::SourceSet;
use ignore::WalkBuilder;

/// Resolved project layout.
#[derive(Debug, Clone)]
pub(crate) struct Project {
	root: PathBuf,
	main: String,
	output: PathBuf,
}

impl Project {
	/// Resolves `main` against `root` (or its own directory) and picks the
	/// output path.
	pub(crate) fn resolve(main: &Path, root: Option<&Path>, output: Option<&Path>) -> Result<Self> {
		let main = std::path::absolute(main).with_context(|| format!("resolving {}", main.display()))?;
		let root = match root {
			Some(root) => std::path::absolute(root).with_context(|| format!("resolving {}", root.display()))?,
			None => main.parent().context("main file has no parent directory")?.to_path_buf(),
		};
		let relative = main
			.strip_prefix(&root)
			.with_context(|| format!("{} is outside the project root {}", main.display(), root.display()))?;
		let main_key = path_key(relative).with_context(|| format!("unsupported main path {}", relative.display()))?;

		let output = match output {
			Some(output) => std::path::absolute(output).with_context(|| format!("resolving {}", output.display()))?,
			None => main.with_extension("pdf"),
		};

		Ok(Self {
			root,
			main: main_key,
			output,
		})
	}

	pub(crate) fn root(&self) -> &Path {
		&self.root
	}

	pub(crate) fn output(&self) -> &Path {
		&self.output
	}

	/// `true` for paths whose change should trigger a recompile.
	pub(crate) fn is_source_change(&self, path: &Path) -> bool {
		path != self.output && !path.components().any(|c| c.as_os_str() == ".git")
	}

	/// Reads every non-ignored file under the root.
	pub(crate) async fn load(&self) -> Result<SourceSet> {
		let project = self.clone();
		folio_worker::spawn_blocking("project.load", move || collect_sources(&project.root, &project.main, &project.output))
			.await
			.context("project loader task failed")?
	}
}

fn collect_sources(root: &Path, main: &str, skip: &Path) -> Result<SourceSet> {
	let mut sources = SourceSet::new(main);
	let walker = WalkBuilder::new(root)
		.hidden(true)
		.git_ignore(true)
		.require_git(false)
		.parents(true)
		.build();

	for entry in walker {
		let entry = entry?;
		if !entry.file_type().is_some_and(|ty| ty.is_file()) {
			continue;
		}
		let path = entry.path();
		if path == skip {
			continue;
		}
		let Some(key) = path.strip_prefix(root).ok().and_then(path_key) else {
			tracing::debug!(path = %path.display(), "project.skip");
			continue;
		};
		let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
		sources.insert(key, data);
	}

	tracing::debug!(root = %root.display(), files = sources.len(), "project.loaded");
	Ok(sources)
}

/// `/`-separated key for a relative path made only of normal components.
fn path_key(relative: &Path) -> Option<String> {
	let mut parts = Vec::new();
	for component in relative.components() {
		match component {
			Component::Normal(part) => parts.push(part.to_str()?.to_owned()),
			Component::CurDir => {}
			_ => return None,
		}
	}
	(!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	fn write(root: &Path, rel: &str, data: &[u8]) {
		let path = root.join(rel);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, data).unwrap();
	}

	#[tokio::test]
	async fn load_collects_sources_and_respects_ignore_files() {
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path();
		write(root, "main.typ", b"#include \"chapters/one.typ\"");
		write(root, "chapters/one.typ", b"= One");
		write(root, "img/logo.png", &[0x89, b'P', b'N', b'G']);
		write(root, "scratch.txt", b"notes");
		write(root, ".ignore", b"scratch.txt\n");
		write(root, "main.pdf", b"%PDF-old");

		let project = Project::resolve(&root.join("main.typ"), None, None).unwrap();
		assert_eq!(project.output(), root.join("main.pdf"));

		let sources = project.load().await.unwrap();
		assert_eq!(sources.main_path(), "main.typ");
		assert!(sources.get("chapters/one.typ").is_some());
		assert!(sources.get("img/logo.png").is_some());
		assert!(sources.get("scratch.txt").is_none());
		assert!(sources.get(".ignore").is_none());
		assert!(sources.get("main.pdf").is_none());
		assert_eq!(sources.len(), 3);
	}

	#[test]
	fn explicit_root_keeps_nested_main_path() {
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path();
		let project = Project::resolve(&root.join("src/main.typ"), Some(root), Some(&root.join("out/doc.pdf"))).unwrap();

		assert_eq!(project.main, "src/main.typ");
		assert_eq!(project.root(), root);
		assert_eq!(project.output(), root.join("out/doc.pdf"));
	}

	#[test]
	fn main_outside_root_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let err = Project::resolve(Path::new("/elsewhere/main.typ"), Some(dir.path()), None).unwrap_err();
		assert!(err.to_string().contains("outside the project root"), "{err}");
	}

	#[test]
	fn output_and_git_changes_do_not_trigger_recompiles() {
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path();
		let project = Project::resolve(&root.join("main.typ"), None, None).unwrap();

		assert!(project.is_source_change(&root.join("main.typ")));
		assert!(!project.is_source_change(&root.join("main.pdf")));
		assert!(!project.is_source_change(&root.join(".git/index")));
	}

	#[test]
	fn path_keys_reject_parent_components() {
		assert_eq!(path_key(Path::new("a/./b.typ")).as_deref(), Some("a/b.typ"));
		assert_eq!(path_key(Path::new("../b.typ")), None);
		assert_eq!(path_key(Path::new("")), None);
	}
}

//! Engine adapter running the `typst` executable.
//!
//! Each tier gets its own font directory; each compile gets a scratch
//! workspace holding the request's overlays and its main source, the latter
//! at its own project-relative path.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use folio_protocol::ResourceTier;
use folio_worker::{AssetBundle, BuildError, EngineBuilder, EngineFailure, EngineHandle, EngineInput, EngineOutput, TypesetEngine};
use tempfile::TempDir;
use tokio::process::Command;

const OUTPUT_NAME: &str = "folio-out.pdf";

pub(crate) struct TypstBuilder {
	bin: PathBuf,
}

impl TypstBuilder {
	pub(crate) fn new(bin: PathBuf) -> Self {
		Self { bin }
	}
}

#[async_trait]
impl EngineBuilder for TypstBuilder {
	async fn build(&self, tier: ResourceTier, bundles: Vec<AssetBundle>) -> Result<EngineHandle, BuildError> {
		let fonts = tempfile::Builder::new()
			.prefix("folio-fonts-")
			.tempdir()
			.map_err(|e| BuildError(format!("creating font directory: {e}")))?;

		let mut count = 0usize;
		for bundle in &bundles {
			for file in &bundle.files {
				let name = Path::new(&file.name)
					.file_name()
					.ok_or_else(|| BuildError(format!("bundle {} has a file without a name", bundle.id)))?;
				tokio::fs::write(fonts.path().join(name), &file.data)
					.await
					.map_err(|e| BuildError(format!("writing font {}: {e}", file.name)))?;
				count += 1;
			}
		}

		tracing::debug!(%tier, bundles = bundles.len(), fonts = count, "typst.fonts.ready");
		Ok(Box::new(TypstEngine {
			bin: self.bin.clone(),
			fonts,
		}))
	}
}

struct TypstEngine {
	bin: PathBuf,
	fonts: TempDir,
}

#[async_trait]
impl TypesetEngine for TypstEngine {
	async fn compile(&mut self, input: EngineInput<'_>) -> Result<EngineOutput, EngineFailure> {
		let workdir = tempfile::Builder::new()
			.prefix("folio-compile-")
			.tempdir()
			.map_err(|e| EngineFailure::new(format!("creating workspace: {e}"), Vec::new()))?;

		for (path, data) in input.overlays {
			write_virtual(workdir.path(), path, data).await?;
		}
		// Last, so no overlay can replace the requested main file.
		let main = write_virtual(workdir.path(), input.main_path, input.main_source.as_bytes()).await?;
		let output_path = workdir.path().join(OUTPUT_NAME);

		let output = Command::new(&self.bin)
			.arg("compile")
			.arg("--root")
			.arg(workdir.path())
			.arg("--font-path")
			.arg(self.fonts.path())
			.arg("--diagnostic-format")
			.arg("short")
			.arg(&main)
			.arg(&output_path)
			.current_dir(workdir.path())
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.output()
			.await
			.map_err(|e| EngineFailure::new(format!("failed to run {}: {e}", self.bin.display()), Vec::new()))?;

		let diagnostics = parse_diagnostics(&output.stderr);
		if !output.status.success() {
			if diagnostics.is_empty() {
				return Err(EngineFailure::new(format!("typst exited with {}", output.status), Vec::new()));
			}
			return Err(EngineFailure::from_diagnostics(diagnostics));
		}

		let artifact = tokio::fs::read(&output_path)
			.await
			.map_err(|e| EngineFailure::new(format!("reading typst output: {e}"), diagnostics.clone()))?;
		Ok(EngineOutput {
			artifact: Bytes::from(artifact),
			diagnostics,
		})
	}
}

/// Writes `data` at virtual path `path` (absolute, `/`-rooted) inside `root`.
async fn write_virtual(root: &Path, path: &str, data: &[u8]) -> Result<PathBuf, EngineFailure> {
	let relative = Path::new(path.trim_start_matches('/'));
	let contained = relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
	if !contained || relative.as_os_str().is_empty() {
		return Err(EngineFailure::new(format!("refusing to mount {path} outside the workspace"), Vec::new()));
	}

	let target = root.join(relative);
	if let Some(parent) = target.parent() {
		tokio::fs::create_dir_all(parent)
			.await
			.map_err(|e| EngineFailure::new(format!("mounting {path}: {e}"), Vec::new()))?;
	}
	tokio::fs::write(&target, data)
		.await
		.map_err(|e| EngineFailure::new(format!("mounting {path}: {e}"), Vec::new()))?;
	Ok(target)
}

/// One diagnostic per non-empty stderr line.
fn parse_diagnostics(stderr: &[u8]) -> Vec<String> {
	String::from_utf8_lossy(stderr)
		.lines()
		.map(str::trim_end)
		.filter(|line| !line.is_empty())
		.map(str::to_owned)
		.collect()
}

#[cfg(test)]
mod tests {
	use folio_worker::Overlays;

	use super::*;

	#[test]
	fn diagnostics_are_split_per_line() {
		let stderr = b"main.typ:1:2: warning: unused\n\nmain.typ:3:1: error: unknown variable: x  \n";
		assert_eq!(
			parse_diagnostics(stderr),
			vec!["main.typ:1:2: warning: unused".to_string(), "main.typ:3:1: error: unknown variable: x".to_string()]
		);
	}

	#[tokio::test]
	async fn virtual_paths_stay_inside_the_workspace() {
		let dir = tempfile::tempdir().unwrap();

		let target = write_virtual(dir.path(), "/img/logo.png", b"png").await.unwrap();
		assert_eq!(target, dir.path().join("img/logo.png"));
		assert_eq!(std::fs::read(&target).unwrap(), b"png");

		let err = write_virtual(dir.path(), "/../escape.typ", b"x").await.unwrap_err();
		assert!(err.message().contains("outside the workspace"), "{err}");
	}

	#[tokio::test]
	async fn missing_executable_is_an_engine_failure() {
		let builder = TypstBuilder::new(PathBuf::from("/nonexistent/folio-typst"));
		let mut engine = builder.build(ResourceTier::BASE, Vec::new()).await.unwrap();
		let overlays = Overlays::new();
		let input = EngineInput {
			main_path: "/main.typ",
			main_source: "= Title",
			overlays: &overlays,
		};

		let err = engine.compile(input).await.unwrap_err();
		assert!(err.message().starts_with("failed to run /nonexistent/folio-typst"), "{err}");
		assert!(err.diagnostics().is_empty());
	}

	/// Stand-in `typst` that writes the main path it was given followed by
	/// that file's content to the output path.
	#[cfg(unix)]
	fn echo_typst(dir: &Path) -> PathBuf {
		use std::os::unix::fs::PermissionsExt;

		let bin = dir.join("typst");
		std::fs::write(&bin, "#!/bin/sh\n{ echo \"$8\"; cat \"$8\"; } > \"$9\"\n").unwrap();
		std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
		bin
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn overlay_named_like_the_main_file_does_not_replace_it() {
		let dir = tempfile::tempdir().unwrap();
		let builder = TypstBuilder::new(echo_typst(dir.path()));
		let mut engine = builder.build(ResourceTier::BASE, Vec::new()).await.unwrap();
		let mut overlays = Overlays::new();
		overlays.insert("/main.typ".into(), Bytes::from_static(b"= Other file"));
		let input = EngineInput {
			main_path: "/main.typ",
			main_source: "= Requested main",
			overlays: &overlays,
		};

		let output = engine.compile(input).await.unwrap();
		let text = String::from_utf8(output.artifact.to_vec()).unwrap();
		assert!(text.ends_with("main.typ\n= Requested main"), "{text}");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn nested_main_is_compiled_from_its_own_directory() {
		let dir = tempfile::tempdir().unwrap();
		let builder = TypstBuilder::new(echo_typst(dir.path()));
		let mut engine = builder.build(ResourceTier::BASE, Vec::new()).await.unwrap();
		let mut overlays = Overlays::new();
		overlays.insert("/src/intro.typ".into(), Bytes::from_static(b"Hi"));
		let input = EngineInput {
			main_path: "/src/main.typ",
			main_source: "#include \"intro.typ\"",
			overlays: &overlays,
		};

		let output = engine.compile(input).await.unwrap();
		let text = String::from_utf8(output.artifact.to_vec()).unwrap();
		let (main, source) = text.split_once('\n').unwrap();
		assert!(main.ends_with("/src/main.typ"), "{main}");
		assert_eq!(source, "#include \"intro.typ\"");
	}
}

//! Asset loader for local font paths and cached HTTP downloads.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use folio_worker::{AssetBundle, AssetError, AssetFile, AssetLoader};

pub(crate) struct BundleLoader {
	client: reqwest::Client,
	cache: Option<PathBuf>,
}

impl BundleLoader {
	pub(crate) fn new(cache: Option<PathBuf>) -> Result<Self, reqwest::Error> {
		let client = reqwest::Client::builder()
			.user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self { client, cache })
	}

	/// `<cache_dir>/folio/bundles`.
	pub(crate) fn default_cache_dir() -> Option<PathBuf> {
		dirs::cache_dir().map(|dir| dir.join("folio").join("bundles"))
	}

	async fn fetch(&self, url: &str) -> Result<AssetBundle, AssetError> {
		let name = remote_file_name(url);
		let cached = self.cache.as_ref().map(|dir| dir.join(cache_key(url)));

		if let Some(path) = &cached
			&& let Ok(data) = tokio::fs::read(path).await
		{
			tracing::debug!(bundle = url, path = %path.display(), "loader.cache.hit");
			return Ok(single_file(url, name, Bytes::from(data)));
		}

		tracing::info!(bundle = url, "downloading asset bundle");
		let fetch_err = |e: reqwest::Error| AssetError::Fetch {
			bundle: url.to_string(),
			reason: e.to_string(),
		};
		let data = self
			.client
			.get(url)
			.send()
			.await
			.map_err(fetch_err)?
			.error_for_status()
			.map_err(fetch_err)?
			.bytes()
			.await
			.map_err(fetch_err)?;

		if let Some(path) = &cached
			&& let Err(err) = store(path, &data).await
		{
			tracing::warn!(bundle = url, error = %err, "loader.cache.write_failed");
		}
		Ok(single_file(url, name, data))
	}

	async fn read_local(&self, id: &str) -> Result<AssetBundle, AssetError> {
		let path = Path::new(id);
		let read_err = |e: std::io::Error| AssetError::Fetch {
			bundle: id.to_string(),
			reason: e.to_string(),
		};
		let meta = match tokio::fs::metadata(path).await {
			Ok(meta) => meta,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(AssetError::NotFound(id.to_string())),
			Err(e) => return Err(read_err(e)),
		};

		if meta.is_file() {
			let data = tokio::fs::read(path).await.map_err(read_err)?;
			let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| id.to_string());
			return Ok(single_file(id, name, Bytes::from(data)));
		}

		let mut paths = Vec::new();
		let mut entries = tokio::fs::read_dir(path).await.map_err(read_err)?;
		while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
			if entry.file_type().await.map_err(read_err)?.is_file() {
				paths.push(entry.path());
			}
		}
		paths.sort();

		let mut files = Vec::with_capacity(paths.len());
		for file in paths {
			let data = tokio::fs::read(&file).await.map_err(read_err)?;
			files.push(AssetFile {
				name: file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
				data: Bytes::from(data),
			});
		}
		Ok(AssetBundle {
			id: id.to_string(),
			files,
		})
	}
}

#[async_trait]
impl AssetLoader for BundleLoader {
	async fn load(&self, bundle: &str) -> Result<AssetBundle, AssetError> {
		if is_remote(bundle) {
			self.fetch(bundle).await
		} else {
			self.read_local(bundle).await
		}
	}
}

fn is_remote(id: &str) -> bool {
	id.starts_with("https://") || id.starts_with("http://")
}

fn single_file(id: &str, name: String, data: Bytes) -> AssetBundle {
	AssetBundle {
		id: id.to_string(),
		files: vec![AssetFile { name, data }],
	}
}

/// Last path segment of `url`, without query or fragment.
fn remote_file_name(url: &str) -> String {
	let path = url.split(['?', '#']).next().unwrap_or(url);
	match path.rsplit('/').next() {
		Some(name) if !name.is_empty() && !name.contains(':') => name.to_string(),
		_ => "bundle".to_string(),
	}
}

/// File-system safe cache entry name for `url`.
fn cache_key(url: &str) -> String {
	let stripped = url.trim_start_matches("https://").trim_start_matches("http://");
	stripped
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
		.collect()
}

async fn store(path: &Path, data: &[u8]) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	let partial = path.with_extension("part");
	tokio::fs::write(&partial, data).await?;
	tokio::fs::rename(&partial, path).await
}

//! TOML configuration for the compile pipeline.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration:
//!
//! ```toml
//! debounce_ms = 1000
//! reply_timeout_ms = 120000   # 0 disables the reply timeout
//!
//! [worker]
//! queue_capacity = 64
//! max_restarts = 3
//! restart_backoff_ms = 50
//! shutdown_timeout_ms = 2000
//!
//! [bundles]
//! core = ["https://example.org/fonts/core.zip"]
//! cjk = []
//! emoji = []
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use folio_worker::{BundlePlan, RestartPolicy, WorkerSpec};
use serde::Deserialize;

use crate::error::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileConfig {
	/// Quiet period of the coalescer.
	pub debounce_ms: u64,
	/// Reply timeout of the service; `0` disables it.
	pub reply_timeout_ms: u64,
	pub worker: WorkerConfig,
	pub bundles: BundlePlan,
}

impl Default for CompileConfig {
	fn default() -> Self {
		Self {
			debounce_ms: 1000,
			reply_timeout_ms: 120_000,
			worker: WorkerConfig::default(),
			bundles: BundlePlan::default(),
		}
	}
}

/// `[worker]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
	pub queue_capacity: usize,
	pub max_restarts: usize,
	pub restart_backoff_ms: u64,
	pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			queue_capacity: 64,
			max_restarts: 3,
			restart_backoff_ms: 50,
			shutdown_timeout_ms: 2000,
		}
	}
}

impl CompileConfig {
	/// Parses and validates a TOML document.
	pub fn parse(input: &str) -> Result<Self> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads configuration from a file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
			path: path.to_path_buf(),
			error: e,
		})?;
		Self::parse(&content)
	}

	/// Loads `explicit` if given, else the per-user file if it exists, else
	/// the defaults.
	pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
		if let Some(path) = explicit {
			return Self::load(path);
		}
		match Self::default_path() {
			Some(path) if path.is_file() => {
				tracing::debug!(path = %path.display(), "config.load");
				Self::load(path)
			}
			_ => Ok(Self::default()),
		}
	}

	/// `<config_dir>/folio/config.toml`.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("folio").join("config.toml"))
	}

	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	/// `None` when the timeout is disabled.
	pub fn reply_timeout(&self) -> Option<Duration> {
		(self.reply_timeout_ms > 0).then(|| Duration::from_millis(self.reply_timeout_ms))
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_millis(self.worker.shutdown_timeout_ms)
	}

	/// Worker parameters derived from the `[worker]` and `[bundles]` tables.
	pub fn worker_spec(&self) -> WorkerSpec {
		let restart = if self.worker.max_restarts == 0 {
			RestartPolicy::Never
		} else {
			RestartPolicy::OnFailure {
				max_restarts: self.worker.max_restarts,
				backoff: Duration::from_millis(self.worker.restart_backoff_ms),
			}
		};
		WorkerSpec {
			queue_capacity: self.worker.queue_capacity,
			restart,
			plan: self.bundles.clone(),
		}
	}

	fn validate(&self) -> Result<()> {
		if self.worker.queue_capacity == 0 {
			return Err(ConfigError::Invalid("worker.queue_capacity must be at least 1".to_string()));
		}
		if self.bundles.core.is_empty() {
			return Err(ConfigError::Invalid("bundles.core must name at least one bundle".to_string()));
		}
		Ok(())
	}
}

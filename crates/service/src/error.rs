//! Service and configuration errors.

use std::path::PathBuf;
use std::time::Duration;

use folio_protocol::ProtocolError;
use thiserror::Error;

/// Why a compile call did not produce a current outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
	/// The source set has no file at the main path.
	#[error("main file `{0}` is missing from the sources")]
	MissingMain(String),

	/// The main file is not valid UTF-8.
	#[error("main file `{0}` is not valid UTF-8")]
	InvalidMain(String),

	/// The worker did not reply within the configured reply timeout.
	#[error("no reply from compile worker within {0:?}")]
	Timeout(Duration),

	/// The worker's result stream closed before the request settled.
	#[error("compile worker exited")]
	WorkerExited,

	/// The worker queue had no room for the request.
	#[error("compile worker queue is full")]
	QueueFull,

	/// The request could not be built.
	#[error("malformed request: {0}")]
	Protocol(ProtocolError),

	/// The service was disposed.
	#[error("compile service disposed")]
	Disposed,
}

impl From<ProtocolError> for ServiceError {
	fn from(err: ProtocolError) -> Self {
		match err {
			ProtocolError::MissingMain(path) => Self::MissingMain(path),
			ProtocolError::InvalidMain(path) => Self::InvalidMain(path),
			other => Self::Protocol(other),
		}
	}
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// A value is out of range.
	#[error("invalid configuration: {0}")]
	Invalid(String),
}

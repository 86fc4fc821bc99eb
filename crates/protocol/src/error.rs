//! Error types for protocol decoding and request construction.

use thiserror::Error;

use crate::RequestId;

/// Errors produced while building or decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
	/// A correlation id was not a decimal counter value.
	#[error("invalid request id: {0:?}")]
	InvalidId(String),

	/// A successful response carried no artifact.
	#[error("response {0} is marked ok but has no artifact")]
	MissingArtifact(RequestId),

	/// A failed response carried no error message.
	#[error("response {0} is marked failed but has no error")]
	MissingError(RequestId),

	/// The main file of a source set is not part of the set.
	#[error("main file not found: {0}")]
	MissingMain(String),

	/// The main file is not valid UTF-8.
	#[error("main file is not valid UTF-8: {0}")]
	InvalidMain(String),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

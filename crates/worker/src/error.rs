//! Error types for tier upgrades and job submission.

use folio_protocol::ResourceTier;
use thiserror::Error;

/// Failure to fetch one asset bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
	/// The bundle identifier does not resolve to anything.
	#[error("asset bundle not found: {0}")]
	NotFound(String),

	/// The bundle exists but could not be read or downloaded.
	#[error("failed to fetch asset bundle {bundle}: {reason}")]
	Fetch {
		/// Bundle identifier.
		bundle: String,
		/// Underlying cause.
		reason: String,
	},
}

/// Failure to construct the compiler resource from loaded bundles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to build compiler: {0}")]
pub struct BuildError(pub String);

/// Failure to bring the compiler resource up to a required tier.
///
/// The tier flags are left untouched when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
	/// Loading a bundle for the target tier failed.
	#[error("tier upgrade to {tier} failed: {source}")]
	Asset {
		/// Tier that was being built.
		tier: ResourceTier,
		/// Loader error.
		source: AssetError,
	},

	/// The engine builder rejected the bundles.
	#[error("tier upgrade to {tier} failed: {source}")]
	Build {
		/// Tier that was being built.
		tier: ResourceTier,
		/// Builder error.
		source: BuildError,
	},
}

/// Error returned when handing a request to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
	/// The worker has been shut down.
	#[error("compile worker stopped")]
	Closed,
	/// The queue is full and a non-blocking submit was used.
	#[error("compile worker queue is full")]
	Full,
}

impl From<crate::QueueError> for SubmitError {
	fn from(err: crate::QueueError) -> Self {
		match err {
			crate::QueueError::Closed => Self::Closed,
			crate::QueueError::Full => Self::Full,
		}
	}
}

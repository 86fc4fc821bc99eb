//! Correlation ids.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Correlation token placed on a request and echoed on its result.
///
/// Ids handed out by one [`RequestIdGen`] are strictly increasing. On the wire
/// the id is a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RequestId(u64);

impl RequestId {
	/// Wraps a raw counter value.
	#[must_use]
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	/// Returns the raw counter value.
	#[must_use]
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for RequestId {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.parse::<u64>().map(Self).map_err(|_| ProtocolError::InvalidId(s.to_owned()))
	}
}

impl From<RequestId> for String {
	fn from(id: RequestId) -> Self {
		id.to_string()
	}
}

impl TryFrom<String> for RequestId {
	type Error = ProtocolError;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		s.parse()
	}
}

/// Shared monotonic id generator, starting at 1.
#[derive(Debug)]
pub struct RequestIdGen {
	next: AtomicU64,
}

impl Default for RequestIdGen {
	fn default() -> Self {
		Self::new()
	}
}

impl RequestIdGen {
	/// Creates a generator whose first id is `1`.
	#[must_use]
	pub const fn new() -> Self {
		Self { next: AtomicU64::new(1) }
	}

	/// Returns the next unique id.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&self) -> RequestId {
		RequestId(self.next.fetch_add(1, Ordering::Relaxed))
	}
}

//! Service-side status machine states.

use std::fmt;

/// Status of the compile service.
///
/// `Idle` only exists before the first dispatch; every dispatch moves to
/// `Compiling`, and the current request's result moves to `Done` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompileStatus {
	/// No request dispatched yet.
	#[default]
	Idle,
	/// A request is in flight.
	Compiling,
	/// The current request produced an artifact.
	Done,
	/// The current request failed.
	Error,
}

impl CompileStatus {
	/// Returns `true` for `Done` and `Error`.
	#[must_use]
	pub const fn is_settled(self) -> bool {
		matches!(self, Self::Done | Self::Error)
	}

	/// Lowercase name used in logs.
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::Compiling => "compiling",
			Self::Done => "done",
			Self::Error => "error",
		}
	}
}

impl fmt::Display for CompileStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

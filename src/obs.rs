//! Optional observability helpers for client calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `arena_client.call` with the `call`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `arena_client_call_total` counter for every
//!   attempt/success/failure, labeled by `call` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Call kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// Caller-issued request through the executor.
	Request,
	/// Credential refresh exchange.
	Refresh,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::Request => "request",
			CallKind::Refresh => "refresh",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a client helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

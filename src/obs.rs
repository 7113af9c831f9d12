//! Optional observability helpers for call execution.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `kurl.call` with the `verb` and `stage` (call
//!   site) fields, plus `warn`/`debug` events for degraded cache operations and sweeps.
//! - Enable `metrics` to increment the `kurl_call_total` counter for every finished call, labeled
//!   by `verb` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// How a call finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Served from a fresh cache entry without touching the network.
	CacheHit,
	/// Completed over the network with a non-401 status.
	Network,
	/// Transport failed before an HTTP status was received.
	TransportFailure,
	/// Final attempt was still answered with HTTP 401.
	Unauthorized,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::CacheHit => "cache_hit",
			CallOutcome::Network => "network",
			CallOutcome::TransportFailure => "transport_failure",
			CallOutcome::Unauthorized => "unauthorized",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

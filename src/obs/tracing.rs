// self
use crate::{_prelude::*, auth::AuthScheme, cache::SweepReport, call::Verb};

/// A span builder used around call execution.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided verb + stage.
	pub fn new(verb: Verb, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("kurl.call", verb = verb.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (verb, stage);

			Self {}
		}
	}

	/// Enters the span for the rest of the current scope.
	pub fn entered(self) -> CallSpanGuard {
		#[cfg(feature = "tracing")]
		{
			CallSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			CallSpanGuard {}
		}
	}
}

/// RAII guard returned by [`CallSpan::entered`].
pub struct CallSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for CallSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CallSpanGuard(..)")
	}
}

/// Reports a cache operation that failed and was skipped.
pub fn record_cache_fault(operation: &'static str, error: &dyn StdError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(operation, error = %error, "cache operation failed; continuing without cache");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, error);
	}
}

/// Reports a completed sweep pass.
pub fn record_sweep(report: SweepReport) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(scanned = report.scanned, removed = report.removed, "cache sweep finished");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = report;
	}
}

/// Reports one 401 answer and the scheme the next attempt will use.
pub fn record_auth_retry(retry: usize, next: AuthScheme) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(retry, next = next.as_str(), "server answered 401; narrowing auth scheme");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (retry, next);
	}
}

//! Call orchestration: request encoding, cache consultation, auth negotiation, and result records.

pub mod options;
pub mod request;
pub mod result;

mod execute;

pub use options::*;
pub use request::*;
pub use result::*;

// self
use crate::{_prelude::*, cache::CacheStore, http::HttpTransport};
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestTransport};

#[cfg(feature = "reqwest")]
/// Executor specialized for the crate's default reqwest transport.
pub type ReqwestExecutor = CallExecutor<ReqwestTransport>;

/// Issues calls through a transport, optionally backed by a response cache.
///
/// The executor holds no per-call state. Each [`CallExecutor::execute`] builds its own auth
/// negotiator and OAuth parameters, so one executor can serve concurrent callers.
#[derive(Clone)]
pub struct CallExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every attempt.
	pub transport: Arc<T>,
	/// Response cache consulted when a call asks for caching.
	pub cache: Option<Arc<dyn CacheStore>>,
}
impl<T> CallExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates an executor around a caller-provided transport.
	pub fn with_transport(transport: impl Into<Arc<T>>) -> Self {
		Self { transport: transport.into(), cache: None }
	}

	/// Attaches a response cache.
	pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
		self.cache = Some(cache);

		self
	}
}
#[cfg(feature = "reqwest")]
impl CallExecutor<ReqwestTransport> {
	/// Creates an executor backed by a default [`ReqwestTransport`].
	pub fn new() -> Result<Self, ConfigError> {
		Ok(Self::with_transport(ReqwestTransport::new()?))
	}
}
impl<T> Debug for CallExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CallExecutor").field("cache_enabled", &self.cache.is_some()).finish()
	}
}

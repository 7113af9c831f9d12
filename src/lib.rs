//! Blocking REST call helper: OAuth 1.0a request signing, TTL-tagged on-disk response caching,
//! and a bounded authentication negotiator that narrows from permissive to specific schemes.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod call;
pub mod clock;
pub mod encode;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{env, path::PathBuf, process};
	// self
	use crate::{
		cache::{FileCache, MemoryCache},
		clock::ManualClock,
	};

	/// Returns a unique, not yet created directory under the system temp dir.
	pub fn temp_cache_dir(label: &str) -> PathBuf {
		let unique = format!(
			"kurl_{label}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	/// Manual clock pinned to a fixed, second-aligned instant.
	pub fn fixed_clock() -> Arc<ManualClock> {
		Arc::new(ManualClock::new(time::macros::datetime!(2025-11-10 12:00 UTC)))
	}

	/// Opens a [`FileCache`] in a fresh temp directory driven by `clock`.
	pub fn temp_file_cache(label: &str, clock: Arc<ManualClock>) -> FileCache {
		FileCache::open(temp_cache_dir(label))
			.expect("Failed to open temporary file cache.")
			.with_clock(clock)
	}

	/// Builds a [`MemoryCache`] driven by `clock`.
	pub fn memory_cache(clock: Arc<ManualClock>) -> MemoryCache {
		MemoryCache::default().with_clock(clock)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as JsonValue;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::Result;
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

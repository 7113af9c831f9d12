//! Response cache contracts and the built-in file and memory stores.
//!
//! Entries are single TTL-tagged blobs. The TTL is part of an entry's identity ([`CacheId`]),
//! so asking for the same request with a different TTL is a cold miss rather than a
//! reinterpretation of an existing entry. Freshness is checked on every lookup; stale entries
//! stay on disk until a (throttled) sweep reclaims them.

pub mod file;
pub mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, call::RequestParams};

/// Calls between sweeps when a store throttles eviction.
pub const DEFAULT_SWEEP_INTERVAL: u32 = 25;

/// Characters stripped from the key material before hashing.
const STRIPPED: [char; 7] = [':', '/', '.', '?', '&', '+', '='];

/// Storage backend contract implemented by response caches.
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Returns the entry only when it exists and is younger than its TTL.
	fn lookup(&self, id: &CacheId) -> Result<Option<CacheEntry>, CacheError>;

	/// Replaces whatever is stored at `id`. Empty bodies clear the slot without writing.
	fn store(&self, id: &CacheId, body: &str) -> Result<(), CacheError>;

	/// Removes every entry for `key`, whatever its TTL. Returns the number removed.
	fn invalidate(&self, key: &CacheKey) -> Result<usize, CacheError>;

	/// Deletes every entry whose age reached its TTL.
	fn sweep(&self) -> Result<SweepReport, CacheError>;

	/// Records one cache-enabled call and sweeps when the throttle allows it.
	///
	/// The default implementation sweeps on every call.
	fn sweep_if_due(&self) -> Result<Option<SweepReport>, CacheError> {
		self.sweep().map(Some)
	}
}

/// Error type produced by [`CacheStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Outcome of a sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Entries inspected.
	pub scanned: usize,
	/// Entries deleted because they outlived their TTL.
	pub removed: usize,
}

/// SHA-256 digest (lowercase hex) identifying a logical request.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);
impl CacheKey {
	/// Derives the key from the effective URL, request headers, and parameters.
	pub fn derive(url: &str, headers: &BTreeMap<String, String>, params: &RequestParams) -> Self {
		let headers = JsonValue::Object(
			headers
				.iter()
				.map(|(name, value)| (name.clone(), JsonValue::from(value.as_str())))
				.collect(),
		);
		let material = format!("{url}{headers}{}", params.to_json());

		Self::from_material(&material)
	}

	/// Hashes raw key material after stripping structural characters.
	pub fn from_material(material: &str) -> Self {
		let stripped: String = material.chars().filter(|c| !STRIPPED.contains(c)).collect();

		Self(hex::encode(Sha256::digest(stripped.as_bytes())))
	}

	/// Hex digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	fn parse(value: &str) -> Option<Self> {
		(value.len() == 64 && value.bytes().all(|byte| byte.is_ascii_hexdigit()))
			.then(|| Self(value.to_ascii_lowercase()))
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Storage identity: key plus the TTL it was written with.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheId {
	/// Request digest.
	pub key: CacheKey,
	/// Time-to-live in seconds, fixed at write time.
	pub ttl_secs: u64,
}
impl CacheId {
	/// Pairs a key with a TTL.
	pub fn new(key: CacheKey, ttl_secs: u64) -> Self {
		Self { key, ttl_secs }
	}

	/// TTL as a [`Duration`].
	pub fn ttl(&self) -> Duration {
		Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX))
	}

	/// File name used by [`FileCache`]: `<hex>-<ttl>.txt`.
	pub fn file_name(&self) -> String {
		format!("{}-{}.txt", self.key, self.ttl_secs)
	}

	/// Parses a file name produced by [`CacheId::file_name`].
	pub fn parse_file_name(name: &str) -> Option<Self> {
		let stem = name.strip_suffix(".txt")?;
		let (key, ttl) = stem.split_once('-')?;

		Some(Self { key: CacheKey::parse(key)?, ttl_secs: ttl.parse().ok()? })
	}

	/// Whether an entry written at `stored_at` is still fresh at `now`.
	pub fn is_fresh(&self, stored_at: OffsetDateTime, now: OffsetDateTime) -> bool {
		now - stored_at < self.ttl()
	}
}

/// Cached response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
	/// Storage identity.
	pub id: CacheId,
	/// Serialized result (JSON text, or the raw response text).
	pub body: String,
	/// Instant the entry was written.
	pub stored_at: OffsetDateTime,
}

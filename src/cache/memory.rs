//! Thread-safe in-memory [`CacheStore`] implementation for tests and short-lived processes.

// self
use crate::{
	_prelude::*,
	cache::{
		CacheEntry, CacheError, CacheId, CacheKey, CacheStore, DEFAULT_SWEEP_INTERVAL, SweepReport,
	},
	clock::{Clock, SystemClock},
};

type EntryMap = Arc<RwLock<HashMap<CacheId, (String, OffsetDateTime)>>>;

/// Keeps entries in-process with the same freshness and sweep semantics as the file store.
#[derive(Clone)]
pub struct MemoryCache {
	entries: EntryMap,
	calls: Arc<Mutex<u32>>,
	clock: Arc<dyn Clock>,
	sweep_interval: u32,
}
impl MemoryCache {
	/// Overrides the clock used for freshness checks and write timestamps.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Sweeps every `interval` calls to [`CacheStore::sweep_if_due`] (minimum 1).
	pub fn with_sweep_interval(mut self, interval: u32) -> Self {
		self.sweep_interval = interval.max(1);

		self
	}

	/// Number of stored entries, fresh or stale.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Whether nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
impl Default for MemoryCache {
	fn default() -> Self {
		Self {
			entries: Default::default(),
			calls: Default::default(),
			clock: Arc::new(SystemClock),
			sweep_interval: DEFAULT_SWEEP_INTERVAL,
		}
	}
}
impl CacheStore for MemoryCache {
	fn lookup(&self, id: &CacheId) -> Result<Option<CacheEntry>, CacheError> {
		let now = self.clock.now();
		let entry = self.entries.read().get(id).and_then(|(body, stored_at)| {
			id.is_fresh(*stored_at, now).then(|| CacheEntry {
				id: id.clone(),
				body: body.clone(),
				stored_at: *stored_at,
			})
		});

		Ok(entry)
	}

	fn store(&self, id: &CacheId, body: &str) -> Result<(), CacheError> {
		let mut guard = self.entries.write();

		guard.remove(id);

		if !body.is_empty() {
			guard.insert(id.clone(), (body.to_owned(), self.clock.now()));
		}

		Ok(())
	}

	fn invalidate(&self, key: &CacheKey) -> Result<usize, CacheError> {
		let mut guard = self.entries.write();
		let before = guard.len();

		guard.retain(|id, _| &id.key != key);

		Ok(before - guard.len())
	}

	fn sweep(&self) -> Result<SweepReport, CacheError> {
		let now = self.clock.now();
		let mut guard = self.entries.write();
		let scanned = guard.len();

		guard.retain(|id, (_, stored_at)| id.is_fresh(*stored_at, now));

		Ok(SweepReport { scanned, removed: scanned - guard.len() })
	}

	fn sweep_if_due(&self) -> Result<Option<SweepReport>, CacheError> {
		{
			let mut calls = self.calls.lock();

			*calls = calls.saturating_add(1);

			if *calls < self.sweep_interval {
				return Ok(None);
			}

			*calls = 0;
		}

		self.sweep().map(Some)
	}
}
impl Debug for MemoryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCache")
			.field("entries", &self.len())
			.field("sweep_interval", &self.sweep_interval)
			.finish()
	}
}

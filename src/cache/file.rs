//! Directory-backed [`CacheStore`]: one `<hex>-<ttl>.txt` file per entry plus a sweep counter.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
	time::SystemTime,
};
// self
use crate::{
	_prelude::*,
	cache::{
		CacheEntry, CacheError, CacheId, CacheKey, CacheStore, DEFAULT_SWEEP_INTERVAL, SweepReport,
	},
	clock::{Clock, SystemClock},
};

/// File holding the number of cache-enabled calls since the last sweep.
pub const SWEEP_COUNTER_FILE: &str = "cachecheck.txt";

/// Persists cache entries as individual files whose modification time is the write instant.
///
/// The directory is shared mutable state: concurrent processes race on the sweep counter and on
/// an entry's delete-then-write sequence, and the last writer wins.
#[derive(Clone)]
pub struct FileCache {
	dir: PathBuf,
	clock: Arc<dyn Clock>,
	sweep_interval: u32,
}
impl FileCache {
	/// Opens (or creates) a cache rooted at `dir`.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| CacheError::Backend {
			message: format!("Failed to create cache directory {}: {e}", dir.display()),
		})?;

		Ok(Self { dir, clock: Arc::new(SystemClock), sweep_interval: DEFAULT_SWEEP_INTERVAL })
	}

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

	/// Cache directory.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Path an entry is stored at.
	pub fn entry_path(&self, id: &CacheId) -> PathBuf {
		self.dir.join(id.file_name())
	}

	fn counter_path(&self) -> PathBuf {
		self.dir.join(SWEEP_COUNTER_FILE)
	}

	fn modified_at(path: &Path) -> Result<Option<OffsetDateTime>, CacheError> {
		match fs::metadata(path).and_then(|meta| meta.modified()) {
			Ok(modified) => Ok(Some(OffsetDateTime::from(modified))),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to inspect {}: {e}", path.display()),
			}),
		}
	}

	fn remove(path: &Path) -> Result<bool, CacheError> {
		match fs::remove_file(path) {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to remove {}: {e}", path.display()),
			}),
		}
	}

	fn entries(&self) -> Result<Vec<(PathBuf, CacheId)>, CacheError> {
		let listing = fs::read_dir(&self.dir).map_err(|e| CacheError::Backend {
			message: format!("Failed to list {}: {e}", self.dir.display()),
		})?;
		let mut entries = Vec::new();

		for item in listing {
			let item = item.map_err(|e| CacheError::Backend {
				message: format!("Failed to list {}: {e}", self.dir.display()),
			})?;
			let name = item.file_name();
			let Some(id) = name.to_str().and_then(CacheId::parse_file_name) else {
				continue;
			};

			entries.push((item.path(), id));
		}

		Ok(entries)
	}

	fn write_stamped(&self, path: &Path, body: &str) -> Result<(), CacheError> {
		let tmp_path = path.with_extension("tmp");
		let stamp = SystemTime::from(self.clock.now());

		{
			let mut file = File::create(&tmp_path).map_err(|e| CacheError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(body.as_bytes()).map_err(|e| CacheError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.set_modified(stamp).map_err(|e| CacheError::Backend {
				message: format!("Failed to stamp {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, path).map_err(|e| CacheError::Backend {
			message: format!("Failed to replace {}: {e}", path.display()),
		})
	}

	fn read_counter(&self) -> Result<u32, CacheError> {
		let path = self.counter_path();

		match fs::read_to_string(&path) {
			Ok(raw) => Ok(raw.trim().parse().unwrap_or(0)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to read {}: {e}", path.display()),
			}),
		}
	}

	fn write_counter(&self, value: u32) -> Result<(), CacheError> {
		let path = self.counter_path();

		fs::write(&path, value.to_string()).map_err(|e| CacheError::Backend {
			message: format!("Failed to write {}: {e}", path.display()),
		})
	}
}
impl CacheStore for FileCache {
	fn lookup(&self, id: &CacheId) -> Result<Option<CacheEntry>, CacheError> {
		let path = self.entry_path(id);
		let Some(stored_at) = Self::modified_at(&path)? else {
			return Ok(None);
		};

		if !id.is_fresh(stored_at, self.clock.now()) {
			return Ok(None);
		}

		match fs::read_to_string(&path) {
			Ok(body) => Ok(Some(CacheEntry { id: id.clone(), body, stored_at })),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) if e.kind() == ErrorKind::InvalidData => Err(CacheError::Serialization {
				message: format!("Cache entry {} is not UTF-8: {e}", path.display()),
			}),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to read {}: {e}", path.display()),
			}),
		}
	}

	fn store(&self, id: &CacheId, body: &str) -> Result<(), CacheError> {
		let path = self.entry_path(id);

		Self::remove(&path)?;

		if body.is_empty() {
			return Ok(());
		}

		self.write_stamped(&path, body)
	}

	fn invalidate(&self, key: &CacheKey) -> Result<usize, CacheError> {
		let mut removed = 0;

		for (path, id) in self.entries()? {
			if &id.key == key && Self::remove(&path)? {
				removed += 1;
			}
		}

		Ok(removed)
	}

	fn sweep(&self) -> Result<SweepReport, CacheError> {
		let now = self.clock.now();
		let mut report = SweepReport::default();

		for (path, id) in self.entries()? {
			report.scanned += 1;

			let Some(stored_at) = Self::modified_at(&path)? else {
				continue;
			};

			if !id.is_fresh(stored_at, now) && Self::remove(&path)? {
				report.removed += 1;
			}
		}

		Ok(report)
	}

	fn sweep_if_due(&self) -> Result<Option<SweepReport>, CacheError> {
		let calls = self.read_counter()?.saturating_add(1);

		if calls < self.sweep_interval {
			self.write_counter(calls)?;

			return Ok(None);
		}

		self.write_counter(0)?;
		self.sweep().map(Some)
	}
}
impl Debug for FileCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FileCache")
			.field("dir", &self.dir)
			.field("sweep_interval", &self.sweep_interval)
			.finish()
	}
}

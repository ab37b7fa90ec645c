use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use tracing::debug;

use crate::CacheError;

/// Default number of entries at which compaction starts.
pub const DEFAULT_SIZE_LIMIT: usize = 50;

/// Construction options for [`BoundedLruCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LruOptions {
	/// Entry count that triggers compaction.
	pub size_limit: usize,
	/// Expected number of concurrent writers; sizes the shard count.
	pub concurrency_hint: usize,
}

impl Default for LruOptions {
	fn default() -> Self {
		Self {
			size_limit: DEFAULT_SIZE_LIMIT,
			concurrency_hint: std::thread::available_parallelism().map_or(4, |n| n.get()),
		}
	}
}

impl LruOptions {
	/// Options with the given size limit and the default concurrency hint.
	pub fn with_size_limit(size_limit: usize) -> Self {
		Self {
			size_limit,
			..Self::default()
		}
	}

	/// Rejects non-positive limits.
	pub fn validate(&self) -> Result<(), CacheError> {
		if self.size_limit == 0 {
			return Err(CacheError::InvalidSizeLimit(self.size_limit));
		}
		if self.concurrency_hint == 0 {
			return Err(CacheError::InvalidConcurrencyHint(self.concurrency_hint));
		}
		Ok(())
	}

	fn shard_amount(&self) -> usize {
		self.concurrency_hint.saturating_mul(4).next_power_of_two().max(2)
	}
}

struct Entry<V> {
	value: V,
	last_access: AtomicU64,
}

/// Thread-safe key/value cache with approximate LRU eviction.
///
/// Each entry carries the tick of its last access. When the cache reaches
/// `size_limit`, roughly half of the coldest entries are evicted against a
/// snapshot of those ticks. Eviction of one entry is a compare under the shard
/// lock: an entry read or rewritten after the snapshot keeps its slot.
///
/// Only one compaction runs at a time. Writers that hit the limit while
/// another compaction is running return immediately and leave the work to it.
pub struct BoundedLruCache<K, V> {
	map: DashMap<K, Entry<V>, FxBuildHasher>,
	size_limit: usize,
	clock: AtomicU64,
	compaction: Mutex<()>,
}

impl<K, V> fmt::Debug for BoundedLruCache<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BoundedLruCache")
			.field("size_limit", &self.size_limit)
			.finish_non_exhaustive()
	}
}

impl<K, V> BoundedLruCache<K, V>
where
	K: Eq + Hash + Clone,
	V: Clone,
{
	/// Creates a cache, rejecting invalid options.
	pub fn new(options: LruOptions) -> Result<Self, CacheError> {
		options.validate()?;
		Ok(Self {
			map: DashMap::with_capacity_and_hasher_and_shard_amount(options.size_limit, FxBuildHasher, options.shard_amount()),
			size_limit: options.size_limit,
			clock: AtomicU64::new(0),
			compaction: Mutex::new(()),
		})
	}

	/// Returns the configured size limit.
	pub fn size_limit(&self) -> usize {
		self.size_limit
	}

	/// Returns a clone of the cached value and marks it as recently used.
	pub fn try_get(&self, key: &K) -> Option<V> {
		let entry = self.map.get(key)?;
		entry.last_access.store(self.tick(), Ordering::Relaxed);
		Some(entry.value.clone())
	}

	/// Inserts or overwrites `key`, compacting if the size limit is reached.
	pub fn set(&self, key: K, value: V) {
		let entry = Entry {
			value,
			last_access: AtomicU64::new(self.tick()),
		};
		self.map.insert(key, entry);
		if self.map.len() >= self.size_limit {
			self.compact();
		}
	}

	/// Removes `key`, returning its value.
	pub fn remove(&self, key: &K) -> Option<V> {
		self.map.remove(key).map(|(_, entry)| entry.value)
	}

	/// Removes every entry.
	pub fn clear(&self) {
		self.map.clear();
	}

	/// Returns the number of live entries.
	pub fn len(&self) -> usize {
		self.map.len()
	}

	/// Returns `true` if the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}

	fn tick(&self) -> u64 {
		self.clock.fetch_add(1, Ordering::Relaxed)
	}

	fn compact(&self) {
		let Some(_guard) = self.compaction.try_lock() else {
			return;
		};
		// Writers skipped by `try_lock` rely on this loop to bring the size
		// back under the limit.
		while self.map.len() >= self.size_limit {
			let snapshot = self.access_snapshot();
			let candidates = snapshot.len();
			let evicted = self.evict_coldest(snapshot);
			debug!(candidates, evicted, remaining = self.map.len(), "lru.compact");
			if evicted == 0 {
				break;
			}
		}
	}

	/// Captures `(key, last_access)` for every entry.
	fn access_snapshot(&self) -> Vec<(K, u64)> {
		self.map
			.iter()
			.map(|entry| (entry.key().clone(), entry.value().last_access.load(Ordering::Relaxed)))
			.collect()
	}

	/// Evicts the colder half of `snapshot`, skipping entries touched since.
	fn evict_coldest(&self, mut snapshot: Vec<(K, u64)>) -> usize {
		snapshot.sort_unstable_by_key(|(_, stamp)| *stamp);
		let victims = snapshot.len().div_ceil(2);
		snapshot
			.into_iter()
			.take(victims)
			.filter(|(key, stamp)| {
				self.map
					.remove_if(key, |_, entry| entry.last_access.load(Ordering::Relaxed) == *stamp)
					.is_some()
			})
			.count()
	}
}

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sprig_cache::{BoundedLruCache, CacheError, InterningWeakCache};
use sprig_checksum::{Checksum, ChecksumDelta, Checksummed};
use sprig_worker::CancellationToken;
use tracing::{debug, trace};

use crate::result::{ResultEntry, ResultIdClock};
use crate::{DeltaResult, MissPolicy, Producer, ResolveError, ResolverConfig, ResultId};

/// Hit/miss counters for delta requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
	/// Requests whose result id matched the cached entry.
	pub hits: u64,
	/// Requests with no id, an unknown id, or an expired id.
	pub misses: u64,
	/// Result ids minted.
	pub minted: u64,
}

/// Outcome of [`CachedResolver::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refreshed {
	/// Id cached before the refresh, if any.
	pub previous: Option<ResultId>,
	/// Changes relative to `previous`.
	pub delta: DeltaResult,
	/// The recomputed sequence.
	pub current: Arc<[Checksum]>,
}

impl Refreshed {
	/// Returns `true` if the cached id was kept.
	pub fn is_unchanged(&self) -> bool {
		self.previous == Some(self.delta.result_id)
	}
}

/// Which cached entry a recomputation is compared against.
#[derive(Debug, Clone, Copy)]
enum Baseline {
	/// The entry only if its id is the caller's.
	Requested(Option<ResultId>),
	/// Whatever entry is cached.
	Current,
}

#[derive(Debug, Default)]
struct Counters {
	hits: AtomicU64,
	misses: AtomicU64,
	minted: AtomicU64,
}

/// Versioned, checksum-based cache of per-project descriptor sets.
///
/// Per project key the resolver is either unknown or holds one
/// `(result id, checksums)` entry. Entries are replaced, never edited, and a
/// new id is minted only when content changes (subject to [`MissPolicy`] for
/// callers without a valid baseline).
///
/// Producers run outside any lock. The compare/mint/replace step runs under a
/// single resolver-wide gate, so concurrent resolutions never mint two ids for
/// the same transition. When two callers race, the last one through the gate
/// wins; the other's work is discarded, not merged.
pub struct CachedResolver<K, T> {
	results: BoundedLruCache<K, Arc<ResultEntry>>,
	interned: InterningWeakCache<Checksum, T>,
	clock: ResultIdClock,
	gate: Mutex<()>,
	miss_policy: MissPolicy,
	counters: Counters,
}

impl<K, T> fmt::Debug for CachedResolver<K, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CachedResolver")
			.field("results", &self.results)
			.field("interned", &self.interned)
			.field("miss_policy", &self.miss_policy)
			.finish_non_exhaustive()
	}
}

impl<K, T> CachedResolver<K, T>
where
	K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
	T: Checksummed + Send + Sync,
{
	/// Creates a resolver, rejecting invalid cache settings.
	pub fn new(config: &ResolverConfig) -> Result<Self, CacheError> {
		config.validate()?;
		Ok(Self {
			results: BoundedLruCache::new(config.lru_options())?,
			interned: InterningWeakCache::new(config.intern_options())?,
			clock: ResultIdClock::default(),
			gate: Mutex::new(()),
			miss_policy: config.miss_policy,
			counters: Counters::default(),
		})
	}

	/// Returns the canonical shared instance for `descriptor`.
	///
	/// If an equal descriptor is already live, that instance is returned and
	/// `descriptor` is dropped.
	pub fn intern(&self, descriptor: Arc<T>) -> Arc<T> {
		let checksum = descriptor.checksum();
		self.interned.get_or_add(checksum, descriptor)
	}

	/// Looks up a live interned descriptor by checksum.
	pub fn descriptor(&self, checksum: &Checksum) -> Option<Arc<T>> {
		self.interned.try_get(checksum)
	}

	/// Returns the descriptors of `key` as of `result_id`.
	///
	/// Empty if `result_id` is not the cached one; the caller should fall back
	/// to [`Self::get_delta`]. Descriptors that have since been reclaimed are
	/// skipped.
	pub fn get_values(&self, key: &K, result_id: ResultId) -> Vec<Arc<T>> {
		let Some(entry) = self.results.try_get(key).filter(|entry| entry.result_id == result_id) else {
			trace!(project = ?key, %result_id, "resolver.values_miss");
			return Vec::new();
		};
		entry.checksums.iter().filter_map(|checksum| self.interned.try_get(checksum)).collect()
	}

	/// Returns the id currently cached for `key`, if any.
	pub fn current_result_id(&self, key: &K) -> Option<ResultId> {
		self.results.try_get(key).map(|entry| entry.result_id)
	}

	/// Recomputes `key` and reports what changed since `last_result_id`.
	///
	/// On producer failure or cancellation nothing cached is touched.
	pub async fn get_delta<P>(
		&self,
		key: &K,
		last_result_id: Option<ResultId>,
		producer: &P,
		cancel: &CancellationToken,
	) -> Result<DeltaResult, ResolveError>
	where
		P: Producer<K, T> + ?Sized,
	{
		let current = self.compute(key, producer, cancel).await?;
		let (_, delta) = self.publish(key, Baseline::Requested(last_result_id), current);
		Ok(delta)
	}

	/// Recomputes `key` against whatever entry is cached for it.
	///
	/// Unlike [`Self::get_delta`] this never misses on an id some other caller
	/// replaced: unchanged content keeps the cached id, so clients polling
	/// with that id stay on the delta path.
	pub async fn refresh<P>(&self, key: &K, producer: &P, cancel: &CancellationToken) -> Result<Refreshed, ResolveError>
	where
		P: Producer<K, T> + ?Sized,
	{
		let current = self.compute(key, producer, cancel).await?;
		let (previous, delta) = self.publish(key, Baseline::Current, Arc::clone(&current));
		Ok(Refreshed { previous, delta, current })
	}

	async fn compute<P>(&self, key: &K, producer: &P, cancel: &CancellationToken) -> Result<Arc<[Checksum]>, ResolveError>
	where
		P: Producer<K, T> + ?Sized,
	{
		let descriptors = producer.compute(key, cancel).await?;
		if cancel.is_cancelled() {
			return Err(ResolveError::Cancelled);
		}
		Ok(descriptors
			.into_iter()
			.map(|descriptor| {
				let checksum = descriptor.checksum();
				self.interned.get_or_add(checksum, descriptor);
				checksum
			})
			.collect())
	}

	/// Compares `current` with the cached entry, minting and storing a new id
	/// when the versioning rules call for it.
	///
	/// Returns the id cached before this call alongside the result.
	fn publish(&self, key: &K, baseline: Baseline, current: Arc<[Checksum]>) -> (Option<ResultId>, DeltaResult) {
		let _gate = self.gate.lock();

		let cached = self.results.try_get(key);
		let previous = cached.as_ref().map(|entry| entry.result_id);
		let matched = match baseline {
			Baseline::Requested(last) => cached.as_ref().filter(|entry| Some(entry.result_id) == last),
			Baseline::Current => cached.as_ref(),
		};
		let cache_hit = matched.is_some();
		let delta = ChecksumDelta::between(matched.map_or(&[][..], |entry| &*entry.checksums), &current);

		let reuse = match (matched, cached.as_ref()) {
			(Some(entry), _) if delta.is_empty() => Some(entry.result_id),
			(None, Some(entry)) if self.miss_policy == MissPolicy::ReuseCurrent => {
				ChecksumDelta::between(&entry.checksums, &current).is_empty().then_some(entry.result_id)
			}
			_ => None,
		};

		let result_id = match reuse {
			Some(id) => id,
			None => {
				let id = self.clock.mint();
				self.counters.minted.fetch_add(1, Ordering::Relaxed);
				self.results.set(
					key.clone(),
					Arc::new(ResultEntry {
						result_id: id,
						checksums: Arc::clone(&current),
					}),
				);
				id
			}
		};

		let counter = if cache_hit { &self.counters.hits } else { &self.counters.misses };
		counter.fetch_add(1, Ordering::Relaxed);
		debug!(
			project = ?key,
			?baseline,
			?previous,
			%result_id,
			cache_hit,
			minted = reuse.is_none(),
			count = current.len(),
			added = delta.added.len(),
			removed = delta.removed.len(),
			"resolver.delta"
		);

		let delta = DeltaResult {
			is_delta: cache_hit,
			result_id,
			added: delta.added,
			removed: delta.removed,
		};
		(previous, delta)
	}

	/// Drops the cached entry for `key`.
	pub fn forget(&self, key: &K) {
		let _gate = self.gate.lock();
		self.results.remove(key);
	}

	/// Returns a snapshot of the request counters.
	pub fn stats(&self) -> ResolverStats {
		ResolverStats {
			hits: self.counters.hits.load(Ordering::Relaxed),
			misses: self.counters.misses.load(Ordering::Relaxed),
			minted: self.counters.minted.load(Ordering::Relaxed),
		}
	}
}

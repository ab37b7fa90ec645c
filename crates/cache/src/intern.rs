use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::CacheError;

/// Default number of insert attempts between dead-slot sweeps.
pub const DEFAULT_CLEAN_UP_THRESHOLD: usize = 200;

/// Construction options for [`InterningWeakCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternOptions {
	/// Insert attempts between sweeps of reclaimed slots.
	pub clean_up_threshold: usize,
}

impl Default for InternOptions {
	fn default() -> Self {
		Self {
			clean_up_threshold: DEFAULT_CLEAN_UP_THRESHOLD,
		}
	}
}

struct InternState<K, V> {
	slots: FxHashMap<K, Weak<V>>,
	inserts_since_sweep: usize,
}

/// Keyed cache of weakly held values.
///
/// Used to collapse equal values produced repeatedly (same key) into one
/// shared instance. The cache never keeps a value alive: once every external
/// [`Arc`] is dropped the slot is dead, lookups treat it as absent, and the
/// next insertion under that key replaces it.
///
/// Every operation runs under a single lock. Dead slots are swept every
/// `clean_up_threshold` insert attempts.
pub struct InterningWeakCache<K, V> {
	state: Mutex<InternState<K, V>>,
	clean_up_threshold: usize,
}

impl<K, V> fmt::Debug for InterningWeakCache<K, V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InterningWeakCache")
			.field("clean_up_threshold", &self.clean_up_threshold)
			.field("slots", &self.state.lock().slots.len())
			.finish()
	}
}

impl<K, V> Default for InterningWeakCache<K, V> {
	fn default() -> Self {
		Self {
			state: Mutex::new(InternState {
				slots: FxHashMap::default(),
				inserts_since_sweep: 0,
			}),
			clean_up_threshold: DEFAULT_CLEAN_UP_THRESHOLD,
		}
	}
}

impl<K, V> InterningWeakCache<K, V>
where
	K: Eq + Hash,
{
	/// Creates a cache, rejecting a zero sweep threshold.
	pub fn new(options: InternOptions) -> Result<Self, CacheError> {
		if options.clean_up_threshold == 0 {
			return Err(CacheError::InvalidCleanUpThreshold(options.clean_up_threshold));
		}
		Ok(Self {
			clean_up_threshold: options.clean_up_threshold,
			..Self::default()
		})
	}

	/// Returns the live value for `key`, if any.
	pub fn try_get(&self, key: &K) -> Option<Arc<V>> {
		self.state.lock().slots.get(key).and_then(Weak::upgrade)
	}

	/// Returns the live value for `key`, storing `value` if there is none.
	///
	/// When a live value exists, `value` is dropped and the existing instance
	/// is returned.
	pub fn get_or_add(&self, key: K, value: Arc<V>) -> Arc<V> {
		let mut state = self.state.lock();
		self.note_insert(&mut state);
		match state.slots.get(&key).and_then(Weak::upgrade) {
			Some(existing) => existing,
			None => {
				state.slots.insert(key, Arc::downgrade(&value));
				value
			}
		}
	}

	/// Stores `value` unless a live value exists for `key`.
	///
	/// Returns `true` only if this call stored `value`.
	pub fn try_add(&self, key: K, value: &Arc<V>) -> bool {
		let mut state = self.state.lock();
		self.note_insert(&mut state);
		if state.slots.get(&key).is_some_and(|slot| slot.strong_count() > 0) {
			return false;
		}
		state.slots.insert(key, Arc::downgrade(value));
		true
	}

	/// Returns the number of slots, including ones whose value was reclaimed.
	pub fn len(&self) -> usize {
		self.state.lock().slots.len()
	}

	/// Returns `true` if there are no slots.
	pub fn is_empty(&self) -> bool {
		self.state.lock().slots.is_empty()
	}

	/// Drops every slot whose value has been reclaimed, returning how many.
	pub fn clean_up(&self) -> usize {
		let mut state = self.state.lock();
		Self::sweep(&mut state)
	}

	fn note_insert(&self, state: &mut InternState<K, V>) {
		state.inserts_since_sweep += 1;
		if state.inserts_since_sweep >= self.clean_up_threshold {
			Self::sweep(state);
		}
	}

	fn sweep(state: &mut InternState<K, V>) -> usize {
		let before = state.slots.len();
		state.slots.retain(|_, slot| slot.strong_count() > 0);
		state.inserts_since_sweep = 0;
		let removed = before - state.slots.len();
		trace!(removed, remaining = state.slots.len(), "intern.sweep");
		removed
	}
}

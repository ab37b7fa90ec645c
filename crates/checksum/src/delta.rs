//! Set differences between checksum sequences.
//!
//! Sequences are compared by membership. Duplicates within one sequence are
//! not collapsed: every copy of a missing checksum is reported.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::Checksum;

/// Returns the checksums present in `new` but not in `old`, in `new` order.
pub fn compute_added(old: &[Checksum], new: &[Checksum]) -> Vec<Checksum> {
	difference(new, old)
}

/// Returns the checksums present in `old` but not in `new`, in `old` order.
pub fn compute_removed(old: &[Checksum], new: &[Checksum]) -> Vec<Checksum> {
	difference(old, new)
}

/// Elements of `target` absent from `base`, in `target` order.
///
/// Only the smaller of the two inputs is indexed, keeping this O(n + m).
fn difference(target: &[Checksum], base: &[Checksum]) -> Vec<Checksum> {
	if target.is_empty() {
		return Vec::new();
	}
	if base.is_empty() {
		return target.to_vec();
	}

	if base.len() <= target.len() {
		let base: FxHashSet<&Checksum> = base.iter().collect();
		return target.iter().filter(|c| !base.contains(c)).copied().collect();
	}

	let mut remaining: FxHashSet<Checksum> = target.iter().copied().collect();
	for checksum in base {
		remaining.remove(checksum);
		if remaining.is_empty() {
			return Vec::new();
		}
	}
	target.iter().filter(|c| remaining.contains(c)).copied().collect()
}

/// The `(added, removed)` pair transforming one checksum sequence into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumDelta {
	/// Checksums present only in the newer sequence.
	pub added: Vec<Checksum>,
	/// Checksums present only in the older sequence.
	pub removed: Vec<Checksum>,
}

impl ChecksumDelta {
	/// Computes the delta from `old` to `new`.
	///
	/// Both sides are always computed: with duplicates in either input, the
	/// length difference says nothing about which side changed.
	pub fn between(old: &[Checksum], new: &[Checksum]) -> Self {
		Self {
			added: compute_added(old, new),
			removed: compute_removed(old, new),
		}
	}

	/// Returns `true` when neither side changed.
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}

	/// Replays the delta on top of `base`.
	///
	/// Surviving entries keep their `base` order, added entries follow.
	pub fn apply(&self, base: &[Checksum]) -> Vec<Checksum> {
		let removed: FxHashSet<&Checksum> = self.removed.iter().collect();
		let mut out = Vec::with_capacity(base.len() + self.added.len() - self.removed.len().min(base.len()));
		out.extend(base.iter().filter(|c| !removed.contains(c)).copied());
		out.extend(self.added.iter().copied());
		out
	}
}

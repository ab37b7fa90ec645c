use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sprig_checksum::{Checksum, ChecksumDelta};

/// Version stamp of one observed snapshot of a project's descriptor set.
///
/// Ids come from a counter shared by every project of a resolver, so a larger
/// id is always a later snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(u64);

impl ResultId {
	/// Wraps a raw id received from a client.
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	/// Returns the raw id.
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ResultId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Source of fresh result ids.
///
/// Advanced only while holding the resolver gate.
#[derive(Debug, Default)]
pub(crate) struct ResultIdClock {
	last: AtomicU64,
}

impl ResultIdClock {
	pub fn mint(&self) -> ResultId {
		ResultId(self.last.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
	}
}

/// Cached state for one project.
#[derive(Debug)]
pub(crate) struct ResultEntry {
	pub result_id: ResultId,
	pub checksums: Arc<[Checksum]>,
}

/// Answer to a delta request.
///
/// When `is_delta` is `true`, `added` and `removed` are relative to the
/// sequence the caller held for the id it sent. Otherwise the caller's
/// baseline was unknown: `added` is the complete current set and `removed` is
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaResult {
	/// Whether `added`/`removed` are relative to the caller's baseline.
	pub is_delta: bool,
	/// Id to send on the next request.
	pub result_id: ResultId,
	/// Checksums the caller does not have yet.
	pub added: Vec<Checksum>,
	/// Checksums the caller should drop.
	pub removed: Vec<Checksum>,
}

impl DeltaResult {
	/// A non-delta result carrying the complete `current` sequence.
	pub fn full(result_id: ResultId, current: &[Checksum]) -> Self {
		Self {
			is_delta: false,
			result_id,
			added: current.to_vec(),
			removed: Vec::new(),
		}
	}

	/// Returns `true` if nothing was added or removed.
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}

	/// Reconstructs the current sequence from the caller's previous one.
	pub fn apply_to(&self, previous: &[Checksum]) -> Vec<Checksum> {
		if !self.is_delta {
			return self.added.clone();
		}
		ChecksumDelta {
			added: self.added.clone(),
			removed: self.removed.clone(),
		}
		.apply(previous)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use sprig_checksum::ChecksumBuilder;

	use super::*;

	fn ck(n: u32) -> Checksum {
		ChecksumBuilder::new().append(n).finish()
	}

	#[test]
	fn clock_is_monotonic() {
		let clock = ResultIdClock::default();
		let a = clock.mint();
		let b = clock.mint();
		assert_eq!(a, ResultId::new(1));
		assert!(b > a);
	}

	#[test]
	fn full_result_replaces_previous() {
		let result = DeltaResult {
			is_delta: false,
			result_id: ResultId::new(3),
			added: vec![ck(1), ck(2)],
			removed: vec![],
		};
		assert_eq!(result.apply_to(&[ck(9)]), vec![ck(1), ck(2)]);
	}

	#[test]
	fn delta_result_applies_on_baseline() {
		let result = DeltaResult {
			is_delta: true,
			result_id: ResultId::new(4),
			added: vec![ck(3)],
			removed: vec![ck(1)],
		};
		assert_eq!(result.apply_to(&[ck(1), ck(2)]), vec![ck(2), ck(3)]);
	}

	#[test]
	fn serializes_camel_case() {
		let result = DeltaResult {
			is_delta: true,
			result_id: ResultId::new(7),
			added: vec![],
			removed: vec![],
		};
		let json = serde_json::to_value(&result).unwrap();
		assert_eq!(json, serde_json::json!({ "isDelta": true, "resultId": 7, "added": [], "removed": [] }));
	}
}

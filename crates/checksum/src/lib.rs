//! Content checksums used as identity keys for descriptors.
//!
//! A [`Checksum`] is a 128-bit digest over a typed encoding of appended values.
//! It is stable across processes and machines, so a long-running server and a
//! transient client can compare descriptor sets by exchanging checksums only.
//! The [`delta`] module computes added/removed sets between two checksum
//! sequences.

mod checksum;
pub mod delta;

pub use checksum::{Checksum, ChecksumBuilder, ChecksumValue, Checksummed};
pub use delta::{ChecksumDelta, compute_added, compute_removed};

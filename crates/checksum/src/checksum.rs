use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use xxhash_rust::xxh3::Xxh3;

/// Type tags written ahead of every appended value.
///
/// Tags keep `(1u32, 2u32)` distinct from `(1u64 | 2 << 32)`, `None` distinct
/// from the empty string and `Some(None)` distinct from `None`. Values must
/// never be renumbered.
mod tag {
	pub const FALSE: u8 = 0x01;
	pub const TRUE: u8 = 0x02;
	pub const I32: u8 = 0x03;
	pub const I64: u8 = 0x04;
	pub const U32: u8 = 0x05;
	pub const U64: u8 = 0x06;
	pub const STR: u8 = 0x07;
	pub const NONE: u8 = 0x08;
	pub const CHECKSUM: u8 = 0x09;
	pub const SEQ: u8 = 0x0a;
	pub const SOME: u8 = 0x0b;
}

/// 128-bit content digest.
///
/// Two checksums are equal iff the appended data was equal under the same
/// encoding. Serialized as a 32-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Checksum([u8; 16]);

impl Checksum {
	/// Width of a checksum in bytes.
	pub const LEN: usize = 16;

	/// Wraps raw digest bytes.
	pub const fn from_bytes(bytes: [u8; 16]) -> Self {
		Self(bytes)
	}

	/// Returns the raw digest bytes.
	pub const fn as_bytes(&self) -> &[u8; 16] {
		&self.0
	}

	/// Returns a fresh builder.
	pub fn builder() -> ChecksumBuilder {
		ChecksumBuilder::new()
	}

	/// Returns the checksum of a descriptor.
	pub fn of<T: Checksummed + ?Sized>(value: &T) -> Self {
		value.checksum()
	}
}

impl fmt::Display for Checksum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in &self.0 {
			write!(f, "{byte:02x}")?;
		}
		Ok(())
	}
}

impl fmt::Debug for Checksum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Checksum({:02x}{:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2], self.0[3])
	}
}

/// Error returned when parsing a hex checksum fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseChecksumError {
	/// Input was not exactly 32 characters.
	#[error("checksum must be {expected} hex characters, got {actual}")]
	Length { expected: usize, actual: usize },
	/// Input contained a non-hex character.
	#[error("invalid hex digit {0:?} in checksum")]
	Digit(char),
}

impl FromStr for Checksum {
	type Err = ParseChecksumError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.len() != Self::LEN * 2 {
			return Err(ParseChecksumError::Length {
				expected: Self::LEN * 2,
				actual: s.len(),
			});
		}
		let mut bytes = [0u8; 16];
		let mut digits = s.chars();
		for byte in &mut bytes {
			let mut nibble = || {
				let c = digits.next().unwrap_or('\0');
				c.to_digit(16).map(|d| d as u8).ok_or(ParseChecksumError::Digit(c))
			};
			*byte = (nibble()? << 4) | nibble()?;
		}
		Ok(Self(bytes))
	}
}

impl Serialize for Checksum {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Checksum {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let text = String::deserialize(deserializer)?;
		text.parse().map_err(serde::de::Error::custom)
	}
}

/// Values that can be appended to a [`ChecksumBuilder`].
///
/// Implemented for the primitive field types descriptors are made of. Types
/// without an implementation are rejected at compile time.
pub trait ChecksumValue {
	/// Writes the tagged encoding of `self` into `builder`.
	fn append_to(&self, builder: &mut ChecksumBuilder);
}

/// Types whose identity for caching purposes is a [`Checksum`].
pub trait Checksummed {
	/// Returns the content checksum. Must be deterministic for equal content.
	fn checksum(&self) -> Checksum;
}

/// Incremental, order-sensitive checksum builder.
///
/// ```
/// use sprig_checksum::ChecksumBuilder;
///
/// let mut builder = ChecksumBuilder::new();
/// builder.append(true).append("div").append(Some("class"));
/// let checksum = builder.finish();
/// assert_eq!(checksum, ChecksumBuilder::new().append(true).append("div").append(Some("class")).finish());
/// ```
pub struct ChecksumBuilder {
	hasher: Xxh3,
}

impl Default for ChecksumBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ChecksumBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChecksumBuilder").finish_non_exhaustive()
	}
}

impl ChecksumBuilder {
	/// Creates an empty builder using the fixed default XXH3 seed.
	pub fn new() -> Self {
		Self { hasher: Xxh3::new() }
	}

	/// Appends one value.
	pub fn append(&mut self, value: impl ChecksumValue) -> &mut Self {
		value.append_to(self);
		self
	}

	/// Returns the checksum of everything appended so far.
	pub fn finish(&self) -> Checksum {
		Checksum(self.hasher.digest128().to_le_bytes())
	}

	fn write_tag(&mut self, tag: u8) {
		self.hasher.update(&[tag]);
	}

	fn write(&mut self, tag: u8, bytes: &[u8]) {
		self.hasher.update(&[tag]);
		self.hasher.update(bytes);
	}

	fn write_len(&mut self, len: usize) {
		self.hasher.update(&(len as u64).to_le_bytes());
	}
}

impl ChecksumValue for bool {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write_tag(if *self { tag::TRUE } else { tag::FALSE });
	}
}

impl ChecksumValue for i32 {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write(tag::I32, &self.to_le_bytes());
	}
}

impl ChecksumValue for i64 {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write(tag::I64, &self.to_le_bytes());
	}
}

impl ChecksumValue for u32 {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write(tag::U32, &self.to_le_bytes());
	}
}

impl ChecksumValue for u64 {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write(tag::U64, &self.to_le_bytes());
	}
}

// Platform-independent: always widened to u64.
impl ChecksumValue for usize {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		(*self as u64).append_to(builder);
	}
}

impl ChecksumValue for str {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write_tag(tag::STR);
		builder.write_len(self.len());
		builder.hasher.update(self.as_bytes());
	}
}

impl ChecksumValue for String {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		self.as_str().append_to(builder);
	}
}

impl ChecksumValue for Checksum {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write(tag::CHECKSUM, &self.0);
	}
}

impl<T: ChecksumValue> ChecksumValue for Option<T> {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		match self {
			Some(value) => {
				builder.write_tag(tag::SOME);
				value.append_to(builder);
			}
			None => builder.write_tag(tag::NONE),
		}
	}
}

impl<T: ChecksumValue> ChecksumValue for [T] {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		builder.write_tag(tag::SEQ);
		builder.write_len(self.len());
		for item in self {
			item.append_to(builder);
		}
	}
}

impl<T: ChecksumValue> ChecksumValue for Vec<T> {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		self.as_slice().append_to(builder);
	}
}

impl<T: ChecksumValue + ?Sized> ChecksumValue for &T {
	fn append_to(&self, builder: &mut ChecksumBuilder) {
		(**self).append_to(builder);
	}
}

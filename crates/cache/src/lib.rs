//! In-memory caches shared by the resolver.
//!
//! - [`BoundedLruCache`]: size-bounded memoization with approximate LRU
//!   eviction. Reads and writes stay on sharded locks; only compaction is
//!   serialized.
//! - [`InterningWeakCache`]: collapses equal values to one shared instance
//!   without keeping it alive.

mod error;
mod intern;
mod lru;

pub use error::CacheError;
pub use intern::{DEFAULT_CLEAN_UP_THRESHOLD, InternOptions, InterningWeakCache};
pub use lru::{BoundedLruCache, DEFAULT_SIZE_LIMIT, LruOptions};

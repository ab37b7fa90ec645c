/// Cache construction errors.
///
/// These indicate programming errors in configuration and are reported
/// eagerly when a cache is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
	/// `size_limit` must be positive.
	#[error("cache size limit must be positive, got {0}")]
	InvalidSizeLimit(usize),
	/// `concurrency_hint` must be positive.
	#[error("cache concurrency hint must be positive, got {0}")]
	InvalidConcurrencyHint(usize),
	/// `clean_up_threshold` must be positive.
	#[error("interning clean-up threshold must be positive, got {0}")]
	InvalidCleanUpThreshold(usize),
}

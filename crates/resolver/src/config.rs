use std::time::Duration;

use serde::{Deserialize, Serialize};
use sprig_cache::{CacheError, DEFAULT_CLEAN_UP_THRESHOLD, DEFAULT_SIZE_LIMIT, InternOptions, LruOptions};
use sprig_worker::{BatchOptions, DEFAULT_DEBOUNCE_DELAY};

/// How a delta request with an unknown or expired result id is versioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPolicy {
	/// Always mint a fresh id when the caller's id is not the cached one.
	#[default]
	MintFresh,
	/// Hand back the cached id when the recomputed content matches it, and
	/// mint only when content differs.
	ReuseCurrent,
}

/// Tunables for the resolver and the service around it.
///
/// Every field has a default, so an empty TOML document is a valid config:
///
/// ```toml
/// size_limit = 50
/// concurrency_hint = 8
/// clean_up_threshold = 200
/// debounce_delay_ms = 100
/// miss_policy = "mint_fresh"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
	/// Projects kept in the result cache before compaction.
	pub size_limit: usize,
	/// Expected number of concurrent callers.
	pub concurrency_hint: usize,
	/// Insert attempts between sweeps of reclaimed interned descriptors.
	pub clean_up_threshold: usize,
	/// Quiet period before queued project-change notifications are handled.
	pub debounce_delay_ms: u64,
	/// Versioning rule for requests whose baseline is unknown.
	pub miss_policy: MissPolicy,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		let lru = LruOptions::default();
		Self {
			size_limit: DEFAULT_SIZE_LIMIT,
			concurrency_hint: lru.concurrency_hint,
			clean_up_threshold: DEFAULT_CLEAN_UP_THRESHOLD,
			debounce_delay_ms: DEFAULT_DEBOUNCE_DELAY.as_millis() as u64,
			miss_policy: MissPolicy::default(),
		}
	}
}

/// Errors loading a [`ResolverConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// The document is not valid TOML or has unknown keys.
	#[error("failed to parse resolver config: {0}")]
	Parse(#[from] toml::de::Error),
	/// A value is out of range.
	#[error(transparent)]
	Invalid(#[from] CacheError),
}

impl ResolverConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks every knob the caches would reject.
	pub fn validate(&self) -> Result<(), CacheError> {
		self.lru_options().validate()?;
		if self.clean_up_threshold == 0 {
			return Err(CacheError::InvalidCleanUpThreshold(0));
		}
		Ok(())
	}

	/// Options for the per-project result cache.
	pub fn lru_options(&self) -> LruOptions {
		LruOptions {
			size_limit: self.size_limit,
			concurrency_hint: self.concurrency_hint,
		}
	}

	/// Options for the descriptor interning cache.
	pub fn intern_options(&self) -> InternOptions {
		InternOptions {
			clean_up_threshold: self.clean_up_threshold,
		}
	}

	/// Quiet period before change notifications are processed.
	pub fn debounce_delay(&self) -> Duration {
		Duration::from_millis(self.debounce_delay_ms)
	}

	/// Options for the change-notification queue.
	pub fn batch_options(&self) -> BatchOptions {
		BatchOptions::with_delay(self.debounce_delay())
	}
}

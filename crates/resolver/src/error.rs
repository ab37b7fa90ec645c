use std::error::Error as StdError;

/// Failure reported by a [`Producer`](crate::Producer).
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
	/// The computation observed its cancellation token and stopped.
	#[error("descriptor computation was cancelled")]
	Cancelled,
	/// The computation could not run, e.g. the compilation is unavailable.
	#[error("descriptor computation failed: {0}")]
	Failed(#[source] Box<dyn StdError + Send + Sync>),
}

impl ProducerError {
	/// Wraps any error as a [`ProducerError::Failed`].
	pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
		Self::Failed(err.into())
	}
}

/// Errors returned by [`CachedResolver::get_delta`](crate::CachedResolver::get_delta).
///
/// Whatever the variant, the resolver's cached state is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
	/// The request was cancelled before a result was published.
	#[error("resolution cancelled")]
	Cancelled,
	/// The producer failed; retrying is up to the caller.
	#[error(transparent)]
	Producer(ProducerError),
}

impl From<ProducerError> for ResolveError {
	fn from(err: ProducerError) -> Self {
		match err {
			ProducerError::Cancelled => Self::Cancelled,
			err => Self::Producer(err),
		}
	}
}

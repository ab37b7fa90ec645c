use std::sync::Arc;

use async_trait::async_trait;
use sprig_worker::CancellationToken;

use crate::ProducerError;

/// Computes the current descriptor set for a project.
///
/// Implementations typically run a full compilation and may be slow. They must
/// return equal descriptors for unchanged inputs and should stop early with
/// [`ProducerError::Cancelled`] once `cancel` fires.
///
/// The resolver does not keep descriptors alive. Whoever owns the project
/// state must hold the returned descriptors for as long as they should remain
/// retrievable by checksum; passing them through
/// [`CachedResolver::intern`](crate::CachedResolver::intern) first makes that
/// owner share instances with other projects.
#[async_trait]
pub trait Producer<K, T>: Send + Sync
where
	K: Sync,
	T: Send + Sync,
{
	/// Returns the descriptors for `key` in a deterministic order.
	async fn compute(&self, key: &K, cancel: &CancellationToken) -> Result<Vec<Arc<T>>, ProducerError>;
}

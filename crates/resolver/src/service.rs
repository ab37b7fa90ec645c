//! Request entry points and background refresh.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use sprig_cache::{BoundedLruCache, CacheError};
use sprig_checksum::Checksummed;
use sprig_worker::{CancellationToken, DebouncedBatchQueue};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::{CachedResolver, DeltaResult, Producer, ResolveError, ResolverConfig, ResultId};

/// Updates buffered per subscriber before the slowest one starts lagging.
pub const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Change pushed to subscribers after a background refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectUpdate<K> {
	pub key: K,
	/// Relative to the previous update for `key` when `delta.is_delta`,
	/// otherwise the complete set.
	pub delta: DeltaResult,
}

struct ServiceInner<K, T, P> {
	resolver: CachedResolver<K, T>,
	producer: P,
	/// Last id broadcast per project, bounded like the result cache.
	published: BoundedLruCache<K, ResultId>,
	updates: broadcast::Sender<ProjectUpdate<K>>,
}

/// Serves descriptor requests for many projects from one [`CachedResolver`].
///
/// Clients poll with [`request_delta`](Self::request_delta) and
/// [`request_full`](Self::request_full). Project owners call
/// [`notify_changed`](Self::notify_changed) when inputs move; notifications
/// are debounced, each changed project is re-resolved once per burst, and
/// subscribers receive a [`ProjectUpdate`] when its content actually changed.
pub struct DescriptorService<K, T, P> {
	inner: Arc<ServiceInner<K, T, P>>,
	queue: DebouncedBatchQueue<K>,
	cancel: CancellationToken,
}

impl<K, T, P> fmt::Debug for DescriptorService<K, T, P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DescriptorService")
			.field("resolver", &self.inner.resolver)
			.field("queue", &self.queue)
			.field("subscribers", &self.inner.updates.receiver_count())
			.finish()
	}
}

impl<K, T, P> DescriptorService<K, T, P>
where
	K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
	T: Checksummed + Send + Sync + 'static,
	P: Producer<K, T> + 'static,
{
	/// Creates the service and starts its refresh queue.
	///
	/// Must be called within a tokio runtime or the worker fallback runtime is
	/// used. Cancelling `cancel` is equivalent to [`shutdown`](Self::shutdown).
	pub fn new(config: &ResolverConfig, producer: P, cancel: CancellationToken) -> Result<Self, CacheError> {
		let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
		let inner = Arc::new(ServiceInner {
			resolver: CachedResolver::new(config)?,
			producer,
			published: BoundedLruCache::new(config.lru_options())?,
			updates,
		});

		let refresh = Arc::clone(&inner);
		let queue = DebouncedBatchQueue::with_dedup_eq(
			config.batch_options(),
			cancel.clone(),
			|a: &K, b: &K| a == b,
			move |keys: Vec<K>, token| {
				let inner = Arc::clone(&refresh);
				async move { inner.refresh(keys, token).await }
			},
		);

		Ok(Self { inner, queue, cancel })
	}

	/// Returns the descriptors of `key` as of `result_id`, or nothing if that
	/// id is no longer current.
	pub fn request_full(&self, key: &K, result_id: ResultId) -> Vec<Arc<T>> {
		self.inner.resolver.get_values(key, result_id)
	}

	/// Resolves `key` and returns what changed since `last_result_id`.
	pub async fn request_delta(&self, key: &K, last_result_id: Option<ResultId>) -> Result<DeltaResult, ResolveError> {
		if self.cancel.is_cancelled() {
			return Err(ResolveError::Cancelled);
		}
		let token = self.cancel.child_token();
		self.inner.resolver.get_delta(key, last_result_id, &self.inner.producer, &token).await
	}

	/// Schedules `key` for re-resolution after the debounce window.
	pub fn notify_changed(&self, key: K) {
		trace!(project = ?key, "service.notify");
		self.queue.add_work(key);
	}

	/// Subscribes to updates produced by background refreshes.
	pub fn subscribe(&self) -> broadcast::Receiver<ProjectUpdate<K>> {
		self.inner.updates.subscribe()
	}

	/// Waits until every notification sent so far has been processed.
	pub async fn wait_for_pending_updates(&self) {
		self.queue.wait_until_current_batch_completes().await;
	}

	/// The underlying resolver.
	pub fn resolver(&self) -> &CachedResolver<K, T> {
		&self.inner.resolver
	}

	/// Drops everything cached for `key`.
	///
	/// The next refresh of `key` broadcasts its complete set.
	pub fn forget(&self, key: &K) {
		self.inner.resolver.forget(key);
		self.inner.published.remove(key);
	}

	/// Stops background refreshes and fails further delta requests.
	pub fn shutdown(&self) {
		debug!("service.shutdown");
		self.cancel.cancel();
	}

	/// Returns `true` once [`shutdown`](Self::shutdown) ran or the lifetime
	/// token was cancelled.
	pub fn is_shut_down(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

impl<K, T, P> ServiceInner<K, T, P>
where
	K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
	T: Checksummed + Send + Sync,
	P: Producer<K, T>,
{
	/// Re-resolves each key against the resolver's current entry, so client ids
	/// survive unchanged content, and broadcasts ids subscribers have not seen.
	async fn refresh(&self, keys: Vec<K>, token: CancellationToken) {
		debug!(projects = keys.len(), "service.refresh");
		for key in keys {
			if token.is_cancelled() {
				break;
			}
			let refreshed = match self.resolver.refresh(&key, &self.producer, &token).await {
				Ok(refreshed) => refreshed,
				Err(ResolveError::Cancelled) => {
					debug!(project = ?key, "service.refresh_cancelled");
					break;
				}
				Err(err) => {
					warn!(project = ?key, error = %err, "service.refresh_failed");
					continue;
				}
			};

			let result_id = refreshed.delta.result_id;
			let announced = self.published.try_get(&key);
			if announced == Some(result_id) {
				trace!(project = ?key, %result_id, "service.unchanged");
				continue;
			}
			// A client poll may have moved the entry past what subscribers saw.
			let delta = if announced.is_some() && announced == refreshed.previous {
				refreshed.delta
			} else {
				DeltaResult::full(result_id, &refreshed.current)
			};

			self.published.set(key.clone(), result_id);
			if self.updates.send(ProjectUpdate { key, delta }).is_err() {
				trace!("service.no_subscribers");
			}
		}
	}
}

#[cfg(test)]
mod tests;

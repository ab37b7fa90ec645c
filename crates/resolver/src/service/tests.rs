use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::ProducerError;
use crate::descriptor::TagHelperDescriptor;

type Descriptor = Arc<TagHelperDescriptor>;

#[derive(Default)]
struct Workspace {
	sets: Mutex<FxHashMap<&'static str, Vec<Descriptor>>>,
	computed: AtomicUsize,
}

impl Workspace {
	fn install(&self, project: &'static str, set: &[&Descriptor]) {
		self.sets.lock().insert(project, set.iter().map(|d| Arc::clone(d)).collect());
	}
}

#[async_trait]
impl Producer<&'static str, TagHelperDescriptor> for Arc<Workspace> {
	async fn compute(&self, key: &&'static str, _cancel: &CancellationToken) -> Result<Vec<Descriptor>, ProducerError> {
		self.computed.fetch_add(1, Ordering::SeqCst);
		Ok(self.sets.lock().get(key).cloned().unwrap_or_default())
	}
}

struct Offline;

#[async_trait]
impl Producer<&'static str, TagHelperDescriptor> for Offline {
	async fn compute(&self, _key: &&'static str, _cancel: &CancellationToken) -> Result<Vec<Descriptor>, ProducerError> {
		Err(ProducerError::failed("project not loaded"))
	}
}

fn helper(name: &str) -> Descriptor {
	Arc::new(TagHelperDescriptor::new(name, "Web.Mvc"))
}

fn config() -> ResolverConfig {
	ResolverConfig {
		debounce_delay_ms: 50,
		..ResolverConfig::default()
	}
}

fn service(workspace: &Arc<Workspace>) -> DescriptorService<&'static str, TagHelperDescriptor, Arc<Workspace>> {
	DescriptorService::new(&config(), Arc::clone(workspace), CancellationToken::new()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn delta_then_full_request() {
	let (a, b) = (helper("A"), helper("B"));
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a, &b]);
	let service = service(&workspace);

	let delta = service.request_delta(&"web", None).await.unwrap();
	assert!(!delta.is_delta);
	assert_eq!(delta.added, vec![a.checksum(), b.checksum()]);

	let full = service.request_full(&"web", delta.result_id);
	assert_eq!(full.len(), 2);
	assert!(Arc::ptr_eq(&full[0], &a));

	let again = service.request_delta(&"web", Some(delta.result_id)).await.unwrap();
	assert!(again.is_delta);
	assert!(again.is_empty());
	assert_eq!(service.resolver().stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn notifications_coalesce_per_project() {
	let a = helper("A");
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a]);
	workspace.install("api", &[&a]);
	let service = service(&workspace);
	let mut updates = service.subscribe();

	service.notify_changed("web");
	service.notify_changed("api");
	tokio::time::sleep(Duration::from_millis(10)).await;
	service.notify_changed("web");
	service.wait_for_pending_updates().await;

	assert_eq!(workspace.computed.load(Ordering::SeqCst), 2);
	let first = updates.try_recv().unwrap();
	let second = updates.try_recv().unwrap();
	assert_eq!((first.key, second.key), ("web", "api"));
	assert!(!first.delta.is_delta);
	assert_eq!(first.delta.added, vec![a.checksum()]);
	assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn unchanged_project_is_not_rebroadcast() {
	let a = helper("A");
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a]);
	let service = service(&workspace);
	let mut updates = service.subscribe();

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let first = updates.try_recv().unwrap();

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	assert_eq!(workspace.computed.load(Ordering::SeqCst), 2);
	assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
	assert_eq!(service.resolver().current_result_id(&"web"), Some(first.delta.result_id));
}

#[tokio::test(start_paused = true)]
async fn changed_project_broadcasts_delta() {
	let (a, b) = (helper("A"), helper("B"));
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a]);
	let service = service(&workspace);
	let mut updates = service.subscribe();

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let first = updates.try_recv().unwrap();

	workspace.install("web", &[&b]);
	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let second = updates.try_recv().unwrap();

	assert!(!first.delta.is_delta);
	assert!(second.delta.is_delta);
	assert!(second.delta.result_id > first.delta.result_id);
	assert_eq!(second.delta.added, vec![b.checksum()]);
	assert_eq!(second.delta.removed, vec![a.checksum()]);
	assert_eq!(second.delta.apply_to(&first.delta.added), vec![b.checksum()]);
}

#[tokio::test(start_paused = true)]
async fn refresh_keeps_the_id_a_client_polls_with() {
	let a = helper("A");
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a]);
	let service = service(&workspace);
	let mut updates = service.subscribe();

	let polled = service.request_delta(&"web", None).await.unwrap();
	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let announced = updates.try_recv().unwrap();
	assert_eq!(announced.delta, DeltaResult::full(polled.result_id, &[a.checksum()]));

	let again = service.request_delta(&"web", Some(polled.result_id)).await.unwrap();
	assert!(again.is_delta);
	assert!(again.is_empty());
	assert_eq!(again.result_id, polled.result_id);

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));

	let last = service.request_delta(&"web", Some(polled.result_id)).await.unwrap();
	assert!(last.is_delta);
	assert_eq!(last.result_id, polled.result_id);
	assert_eq!(service.resolver().stats().minted, 1);
}

#[tokio::test(start_paused = true)]
async fn change_seen_by_a_poll_is_announced_in_full() {
	let (a, b) = (helper("A"), helper("B"));
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a]);
	let service = service(&workspace);
	let mut updates = service.subscribe();

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let first = updates.try_recv().unwrap();

	workspace.install("web", &[&a, &b]);
	let polled = service.request_delta(&"web", Some(first.delta.result_id)).await.unwrap();
	assert_eq!(polled.added, vec![b.checksum()]);

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let second = updates.try_recv().unwrap();
	assert_eq!(second.delta, DeltaResult::full(polled.result_id, &[a.checksum(), b.checksum()]));

	let after = service.request_delta(&"web", Some(polled.result_id)).await.unwrap();
	assert!(after.is_delta);
	assert_eq!(after.result_id, polled.result_id);
}

#[tokio::test(start_paused = true)]
async fn forget_clears_resolver_and_announcements() {
	let a = helper("A");
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a]);
	let service = service(&workspace);
	let mut updates = service.subscribe();

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let first = updates.try_recv().unwrap();

	service.forget(&"web");
	assert_eq!(service.resolver().current_result_id(&"web"), None);
	assert!(service.request_full(&"web", first.delta.result_id).is_empty());

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	let second = updates.try_recv().unwrap();
	assert!(!second.delta.is_delta);
	assert!(second.delta.result_id > first.delta.result_id);
	assert_eq!(second.delta.added, vec![a.checksum()]);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_is_not_broadcast() {
	let service = DescriptorService::<&'static str, TagHelperDescriptor, _>::new(&config(), Offline, CancellationToken::new()).unwrap();
	let mut updates = service.subscribe();

	service.notify_changed("web");
	service.wait_for_pending_updates().await;
	assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));

	let err = service.request_delta(&"web", None).await.unwrap_err();
	assert!(matches!(err, ResolveError::Producer(_)));
	assert_eq!(service.resolver().current_result_id(&"web"), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_requests_and_refreshes() {
	let a = helper("A");
	let workspace = Arc::new(Workspace::default());
	workspace.install("web", &[&a]);
	let service = service(&workspace);
	let mut updates = service.subscribe();

	service.shutdown();
	assert!(service.is_shut_down());
	assert!(matches!(service.request_delta(&"web", None).await, Err(ResolveError::Cancelled)));

	service.notify_changed("web");
	tokio::time::sleep(Duration::from_millis(200)).await;
	assert_eq!(workspace.computed.load(Ordering::SeqCst), 0);
	assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn rejects_invalid_config() {
	let config = ResolverConfig {
		size_limit: 0,
		..ResolverConfig::default()
	};
	let workspace = Arc::new(Workspace::default());
	let err = DescriptorService::<&'static str, TagHelperDescriptor, _>::new(&config, workspace, CancellationToken::new()).unwrap_err();
	assert_eq!(err, CacheError::InvalidSizeLimit(0));
}

//! Debounced batching of work items.
//!
//! A [`DebouncedBatchQueue`] collapses a burst of enqueued items into a single
//! call of its batch callback. Every enqueue re-arms a quiescence timer; once
//! the timer elapses with nothing new arriving, the accumulated items are
//! drained, optionally de-duplicated, and handed to the callback.
//!
//! # Design
//!
//! Producers push into an unbounded channel and never wait. One background
//! task owns the receiver, resets its deadline on every receive, and runs the
//! callback itself, so flushes are strictly serialized: flush N completes (or
//! is cancelled) before flush N+1 starts.
//!
//! # Cancellation
//!
//! The queue's lifetime token stops the task. Unflushed items are abandoned
//! without invoking the callback. Each flush receives a child token that is
//! also cancelled when a later enqueue asks to supersede existing work.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::TaskClass;
use crate::panic::join_error_panic_message;
use crate::token::GenerationClock;

/// Default quiescence window before a batch is flushed.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(100);

/// Construction options for [`DebouncedBatchQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
	/// Quiet period after the last enqueue before the batch is flushed.
	pub delay: Duration,
	/// Label for the background task.
	pub class: TaskClass,
}

impl Default for BatchOptions {
	fn default() -> Self {
		Self {
			delay: DEFAULT_DEBOUNCE_DELAY,
			class: TaskClass::Background,
		}
	}
}

impl BatchOptions {
	/// Options with the given delay and the default task class.
	pub fn with_delay(delay: Duration) -> Self {
		Self {
			delay,
			..Self::default()
		}
	}
}

type EqFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

struct Enqueued<T> {
	item: T,
	cancel_existing: bool,
}

struct Shared {
	/// Counts items handed to the channel.
	enqueued: GenerationClock,
	/// Count of received items whose batch has finished.
	flushed: watch::Sender<u64>,
	/// Token of the batch currently (or most recently) being processed.
	current_batch: Mutex<CancellationToken>,
}

/// Coalesces bursts of work into single, serialized batch callbacks.
///
/// Dropping the queue closes its channel; items still pending are flushed
/// one last time unless the lifetime token was cancelled.
pub struct DebouncedBatchQueue<T> {
	tx: mpsc::UnboundedSender<Enqueued<T>>,
	shared: Arc<Shared>,
	cancel: CancellationToken,
}

impl<T> fmt::Debug for DebouncedBatchQueue<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DebouncedBatchQueue")
			.field("enqueued", &self.shared.enqueued.current())
			.field("flushed", &*self.shared.flushed.borrow())
			.field("cancelled", &self.cancel.is_cancelled())
			.finish()
	}
}

impl<T> DebouncedBatchQueue<T>
where
	T: Send + 'static,
{
	/// Creates a queue that passes every enqueued item through.
	///
	/// `process` receives the drained batch and a token cancelled when the
	/// queue shuts down or a later enqueue supersedes this batch.
	pub fn new<F, Fut>(options: BatchOptions, cancel: CancellationToken, process: F) -> Self
	where
		F: Fn(Vec<T>, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		Self::spawn(options, cancel, None, process)
	}

	/// Creates a queue that drops items equal (per `eq_fn`) to an earlier item
	/// in the same batch. The first occurrence keeps its position.
	pub fn with_dedup_eq<F, Fut>(
		options: BatchOptions,
		cancel: CancellationToken,
		eq_fn: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
		process: F,
	) -> Self
	where
		F: Fn(Vec<T>, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		Self::spawn(options, cancel, Some(Arc::new(eq_fn)), process)
	}

	fn spawn<F, Fut>(options: BatchOptions, cancel: CancellationToken, dedup: Option<EqFn<T>>, process: F) -> Self
	where
		F: Fn(Vec<T>, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let (tx, rx) = mpsc::unbounded_channel();
		let (flushed, _) = watch::channel(0);
		let shared = Arc::new(Shared {
			enqueued: GenerationClock::new(),
			flushed,
			current_batch: Mutex::new(cancel.child_token()),
		});

		let consumer = Consumer {
			rx,
			shared: Arc::clone(&shared),
			options,
			dedup,
			process,
			cancel: cancel.clone(),
			batches: GenerationClock::new(),
			received: 0,
		};
		crate::spawn(options.class, consumer.run());

		Self { tx, shared, cancel }
	}

	/// Enqueues `item` and re-arms the flush timer.
	pub fn add_work(&self, item: T) {
		self.enqueue(item, false);
	}

	/// Enqueues `item`, discarding every item enqueued before it and
	/// cancelling the batch currently being processed.
	pub fn add_work_cancelling(&self, item: T) {
		self.shared.current_batch.lock().cancel();
		self.enqueue(item, true);
	}

	fn enqueue(&self, item: T, cancel_existing: bool) {
		if self.cancel.is_cancelled() {
			trace!("batch.enqueue_after_cancel");
			return;
		}
		self.shared.enqueued.next();
		if self.tx.send(Enqueued { item, cancel_existing }).is_err() {
			self.shared.enqueued.retract();
		}
	}

	/// Waits until every item enqueued before this call has been flushed, or
	/// the queue has been cancelled.
	pub async fn wait_until_current_batch_completes(&self) {
		let target = self.shared.enqueued.current();
		let mut flushed = self.shared.flushed.subscribe();
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => {}
			_ = flushed.wait_for(|done| *done >= target) => {}
		}
	}

	/// Returns `true` when nothing is pending or being processed.
	pub fn is_idle(&self) -> bool {
		*self.shared.flushed.borrow() >= self.shared.enqueued.current()
	}

	/// Returns `true` once the lifetime token has been cancelled.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

struct Consumer<T, F> {
	rx: mpsc::UnboundedReceiver<Enqueued<T>>,
	shared: Arc<Shared>,
	options: BatchOptions,
	dedup: Option<EqFn<T>>,
	process: F,
	cancel: CancellationToken,
	batches: GenerationClock,
	received: u64,
}

impl<T, F, Fut> Consumer<T, F>
where
	T: Send + 'static,
	F: Fn(Vec<T>, CancellationToken) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	async fn run(mut self) {
		let mut pending = Vec::new();
		loop {
			// Idle: wait for the first item of the next burst.
			let first = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break,
				msg = self.rx.recv() => match msg {
					Some(msg) => msg,
					None => break,
				},
			};
			self.accept(&mut pending, first);

			// Debounce: every receive restarts the quiet period.
			let closed = loop {
				tokio::select! {
					biased;
					_ = self.cancel.cancelled() => {
						debug!(abandoned = pending.len(), "batch.cancelled");
						return;
					}
					msg = self.rx.recv() => match msg {
						Some(msg) => self.accept(&mut pending, msg),
						None => break true,
					},
					_ = tokio::time::sleep(self.options.delay) => break false,
				}
			};

			self.flush(std::mem::take(&mut pending)).await;
			if closed {
				break;
			}
		}
		trace!("batch.stopped");
	}

	fn accept(&mut self, pending: &mut Vec<T>, msg: Enqueued<T>) {
		self.received += 1;
		if msg.cancel_existing {
			trace!(discarded = pending.len(), "batch.cancel_existing");
			pending.clear();
		}
		pending.push(msg.item);
	}

	async fn flush(&mut self, pending: Vec<T>) {
		let items = match &self.dedup {
			Some(eq) => dedup_in_order(pending, eq.as_ref()),
			None => pending,
		};
		let batch = self.batches.next();
		let token = self.cancel.child_token();
		*self.shared.current_batch.lock() = token.clone();

		debug!(batch, items = items.len(), "batch.flush");
		let handle = crate::spawn(self.options.class, (self.process)(items, token));
		if let Err(err) = handle.await {
			match join_error_panic_message(err) {
				Some(msg) => error!(batch, panic = %msg, "batch.callback_panicked"),
				None => debug!(batch, "batch.callback_aborted"),
			}
		}
		self.shared.flushed.send_replace(self.received);
	}
}

fn dedup_in_order<T>(items: Vec<T>, eq: &(dyn Fn(&T, &T) -> bool + Send + Sync)) -> Vec<T> {
	let mut out: Vec<T> = Vec::with_capacity(items.len());
	for item in items {
		if !out.iter().any(|seen| eq(seen, &item)) {
			out.push(item);
		}
	}
	out
}

/// Payload-free variant of [`DebouncedBatchQueue`].
///
/// Any number of signals within one quiet period produce one callback.
pub struct SignalQueue {
	inner: DebouncedBatchQueue<()>,
}

impl fmt::Debug for SignalQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("SignalQueue").field(&self.inner).finish()
	}
}

impl SignalQueue {
	/// Creates a signal queue invoking `process` once per quiet burst.
	pub fn new<F, Fut>(options: BatchOptions, cancel: CancellationToken, process: F) -> Self
	where
		F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let inner = DebouncedBatchQueue::<()>::with_dedup_eq(options, cancel, |_: &(), _: &()| true, move |_: Vec<()>, token| process(token));
		Self { inner }
	}

	/// Signals that work is needed and re-arms the timer.
	pub fn add_work(&self) {
		self.inner.add_work(());
	}

	/// Signals work, cancelling the batch currently being processed.
	pub fn add_work_cancelling(&self) {
		self.inner.add_work_cancelling(());
	}

	/// See [`DebouncedBatchQueue::wait_until_current_batch_completes`].
	pub async fn wait_until_current_batch_completes(&self) {
		self.inner.wait_until_current_batch_completes().await;
	}

	/// See [`DebouncedBatchQueue::is_idle`].
	pub fn is_idle(&self) -> bool {
		self.inner.is_idle()
	}
}

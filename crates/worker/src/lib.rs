//! Background task primitives.
//!
//! Tasks are spawned on the ambient tokio runtime when there is one, and on a
//! small shared fallback runtime otherwise. [`DebouncedBatchQueue`] and
//! [`SignalQueue`] coalesce bursts of notifications into single, serialized
//! units of background work.

mod batch;
mod class;
mod panic;
mod spawn;
mod token;

pub use batch::{BatchOptions, DEFAULT_DEBOUNCE_DELAY, DebouncedBatchQueue, SignalQueue};
pub use class::TaskClass;
pub use spawn::spawn;
pub use tokio_util::sync::CancellationToken;

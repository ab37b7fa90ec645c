//! Incremental resolution of per-project descriptor sets.
//!
//! [`CachedResolver`] turns the output of a [`Producer`] into checksum
//! sequences, interns the descriptors so equal ones are shared across
//! projects, and versions each project's set with a monotonic [`ResultId`].
//! Callers poll with the last id they saw and receive a [`DeltaResult`]
//! describing only what changed.
//!
//! [`DescriptorService`] is the transport-facing wrapper: it exposes the two
//! request entry points and coalesces project-change notifications into
//! background re-resolution.

mod config;
pub mod descriptor;
mod error;
mod producer;
mod resolver;
mod result;
mod service;

pub use config::{ConfigError, MissPolicy, ResolverConfig};
pub use error::{ProducerError, ResolveError};
pub use producer::Producer;
pub use resolver::{CachedResolver, Refreshed, ResolverStats};
pub use result::{DeltaResult, ResultId};
pub use service::{DescriptorService, ProjectUpdate, UPDATE_CHANNEL_CAPACITY};
pub use sprig_checksum::{Checksum, Checksummed};
pub use sprig_worker::CancellationToken;

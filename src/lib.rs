//! Shared-ownership lifetime holders for CUDA driver resources.
//!
//! Everything the driver allocates (streams, memory pools, device memory)
//! is identified by an opaque numeric handle and requires exactly one
//! matching teardown call. This crate wraps those handles in reference
//! counted [`Holder`]s: any number of independent holders may reference
//! the same resource, and the driver teardown fires exactly once, when the
//! last of them drops - after every dependent resource has released its
//! reference.
//!
//! - [`resource`] - boxes: one plain value per driver resource, plus the
//!   holders its own teardown depends on.
//! - [`holder`] - the shared-ownership handle and the owned/borrowed
//!   capture protocol.
//! - [`cache`] - per-kind weak-reference dedup, so re-capturing a live
//!   handle can never register a second finalizer.
//! - [`registry`] - the process-wide object owning the driver adapter,
//!   the caches and the diagnostics.
//!
//! The crate never allocates driver resources and never interprets a
//! handle's bit pattern; both stay behind the [`Driver`] trait.

pub mod cache;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod holder;
pub mod registry;
pub mod resource;

// Core API
pub use cache::HolderCache;
pub use diagnostics::Usage;
pub use driver::{Driver, DriverError, RawHandle, STREAM_PER_THREAD};
pub use error::Error;
pub use holder::Holder;
pub use registry::Registry;
pub use resource::{
    Deviceptr, DeviceptrHolder, MemPool, MemPoolHolder, Resource, ResourceKind, Stream,
    StreamHolder,
};

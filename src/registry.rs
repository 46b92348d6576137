//! Process-wide entry point: driver adapter, per-kind caches, diagnostics.
//!
//! A [`Registry`] owns everything capture needs - the [`Driver`] adapter,
//! one dedup cache per resource kind, the live-resource counters and the
//! drop-path error slot. Applications normally construct one at startup
//! via [`init`] and reach it through [`global`]; embedders that want an
//! explicit lifecycle (or isolated tests) construct `Registry` values
//! directly.

use std::sync::{Arc, OnceLock};

use crate::cache::HolderCache;
use crate::diagnostics::Usage;
use crate::driver::{Driver, RawHandle};
use crate::error::{Error, TeardownErrorSlot};
use crate::holder::{Finalizer, Holder};
use crate::resource::{Deviceptr, DeviceptrHolder, MemPool, MemPoolHolder, Stream, StreamHolder};

/// Global registry instance.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Owner of the capture machinery for all resource kinds.
pub struct Registry {
    driver: Arc<dyn Driver>,
    usage: Arc<Usage>,
    errors: Arc<TeardownErrorSlot>,
    streams: HolderCache<Stream>,
    mem_pools: HolderCache<MemPool>,
    deviceptrs: HolderCache<Deviceptr>,
}

impl Registry {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            usage: Arc::new(Usage::new()),
            errors: Arc::new(TeardownErrorSlot::new()),
            streams: HolderCache::new(),
            mem_pools: HolderCache::new(),
            deviceptrs: HolderCache::new(),
        }
    }

    fn finalizer(&self) -> Finalizer {
        Finalizer {
            driver: Arc::clone(&self.driver),
            usage: Arc::clone(&self.usage),
            errors: Arc::clone(&self.errors),
        }
    }

    /// Owning capture of a stream. `raw` must denote a live, not yet
    /// owned stream; its `cuStreamDestroy` fires when the last holder
    /// drops.
    pub fn capture_stream(&self, raw: RawHandle) -> StreamHolder {
        Holder::owned(Stream::new(raw), self.finalizer())
    }

    /// Wrap an externally-owned stream (e.g. the per-thread default
    /// stream). Never torn down by this crate.
    pub fn capture_stream_borrowed(&self, raw: RawHandle) -> StreamHolder {
        Holder::borrowed(Stream::new(raw))
    }

    /// Deduplicated owning capture of a stream.
    pub fn get_or_capture_stream(&self, raw: RawHandle) -> StreamHolder {
        self.streams.get_or_capture(raw, || self.capture_stream(raw))
    }

    /// Owning capture of a memory pool.
    pub fn capture_mem_pool(&self, raw: RawHandle) -> MemPoolHolder {
        Holder::owned(MemPool::new(raw), self.finalizer())
    }

    /// Wrap an externally-owned memory pool (e.g. a device's default pool).
    pub fn capture_mem_pool_borrowed(&self, raw: RawHandle) -> MemPoolHolder {
        Holder::borrowed(MemPool::new(raw))
    }

    /// Deduplicated owning capture of a memory pool.
    pub fn get_or_capture_mem_pool(&self, raw: RawHandle) -> MemPoolHolder {
        self.mem_pools
            .get_or_capture(raw, || self.capture_mem_pool(raw))
    }

    /// Owning capture of a device allocation.
    ///
    /// The box keeps `pool` and `stream` alive: the pool owns the
    /// allocation, and the stream orders the `cuMemFreeAsync` issued at
    /// teardown. Both holders gain one owner here and release it when the
    /// allocation's box goes away.
    pub fn capture_deviceptr(
        &self,
        raw: RawHandle,
        pool: &MemPoolHolder,
        stream: &StreamHolder,
    ) -> DeviceptrHolder {
        Holder::owned(
            Deviceptr::new(raw, pool.clone(), stream.clone()),
            self.finalizer(),
        )
    }

    /// Wrap a device allocation this crate must not free.
    pub fn capture_deviceptr_borrowed(&self, raw: RawHandle) -> DeviceptrHolder {
        Holder::borrowed(Deviceptr::new(raw, Holder::sentinel(), Holder::sentinel()))
    }

    /// Deduplicated owning capture of a device allocation.
    ///
    /// The dependency holders are only consulted on a cache miss; a hit
    /// returns the existing box with its already-held dependencies.
    pub fn get_or_capture_deviceptr(
        &self,
        raw: RawHandle,
        pool: &MemPoolHolder,
        stream: &StreamHolder,
    ) -> DeviceptrHolder {
        self.deviceptrs
            .get_or_capture(raw, || self.capture_deviceptr(raw, pool, stream))
    }

    /// Live-resource counters.
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Collect the oldest unread teardown failure from the drop path.
    pub fn take_last_teardown_error(&self) -> Option<Error> {
        self.errors.take()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("streams", &self.streams)
            .field("mem_pools", &self.mem_pools)
            .field("deviceptrs", &self.deviceptrs)
            .finish()
    }
}

/// Initialize the global registry.
///
/// Should be called once at startup, before any capture. A second call is
/// ignored with a warning.
pub fn init(driver: Arc<dyn Driver>) {
    if REGISTRY.set(Registry::new(driver)).is_err() {
        tracing::warn!("Holder registry already initialized");
    } else {
        tracing::info!("Holder registry initialized");
    }
}

/// Get the global registry.
///
/// Panics if [`init`] has not been called.
pub fn global() -> &'static Registry {
    REGISTRY
        .get()
        .expect("Holder registry not initialized. Call registry::init() at startup.")
}

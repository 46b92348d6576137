//! Resource boxes: plain values describing one driver resource each.
//!
//! A box holds the raw driver handle plus holders for any resources its
//! own teardown depends on. Boxes are named after the driver resources
//! they contain, without the `CU` prefix: [`Stream`], [`MemPool`],
//! [`Deviceptr`]. Constructing a box has no driver side effects; teardown
//! side effects live entirely in the finalizer attached at capture time.
//!
//! Every kind has a sentinel value - a valid, finalizer-free box meaning
//! "no resource" (or, for streams, the globally provided default stream).
//! Holders therefore never need a null or empty state.

use std::fmt;
use std::sync::Mutex;

use crate::driver::{Driver, DriverError, RawHandle, STREAM_PER_THREAD};
use crate::holder::Holder;

/// The resource kinds this crate manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Stream,
    MemPool,
    Deviceptr,
}

impl ResourceKind {
    pub const fn name(self) -> &'static str {
        match self {
            ResourceKind::Stream => "Stream",
            ResourceKind::MemPool => "MemPool",
            ResourceKind::Deviceptr => "Deviceptr",
        }
    }

    /// Name of the underlying driver type, for diagnostics and display.
    pub const fn driver_type(self) -> &'static str {
        match self {
            ResourceKind::Stream => "CUstream",
            ResourceKind::MemPool => "CUmemoryPool",
            ResourceKind::Deviceptr => "CUdeviceptr",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resource box managed by [`Holder`]s.
pub trait Resource: Send + Sync + Sized + 'static {
    const KIND: ResourceKind;

    /// The kind's "no resource" value. Always valid to construct and drop;
    /// never carries a finalizer.
    fn sentinel() -> Self;

    /// The boxed raw driver handle.
    fn raw(&self) -> RawHandle;

    /// Issue the driver teardown call for this box.
    ///
    /// Invoked at most once per box, by the finalizer machinery; resource
    /// code never calls this directly.
    fn teardown(&self, driver: &dyn Driver) -> Result<(), DriverError>;
}

/// A `CUstream`.
pub struct Stream {
    raw: RawHandle,
}

impl Stream {
    pub(crate) fn new(raw: RawHandle) -> Self {
        Self { raw }
    }
}

impl Resource for Stream {
    const KIND: ResourceKind = ResourceKind::Stream;

    fn sentinel() -> Self {
        Self {
            raw: STREAM_PER_THREAD,
        }
    }

    fn raw(&self) -> RawHandle {
        self.raw
    }

    fn teardown(&self, driver: &dyn Driver) -> Result<(), DriverError> {
        driver.destroy_stream(self.raw)
    }
}

/// A `CUmemoryPool`.
pub struct MemPool {
    raw: RawHandle,
}

impl MemPool {
    pub(crate) fn new(raw: RawHandle) -> Self {
        Self { raw }
    }
}

impl Resource for MemPool {
    const KIND: ResourceKind = ResourceKind::MemPool;

    fn sentinel() -> Self {
        Self {
            raw: RawHandle::NULL,
        }
    }

    fn raw(&self) -> RawHandle {
        self.raw
    }

    fn teardown(&self, driver: &dyn Driver) -> Result<(), DriverError> {
        driver.destroy_mem_pool(self.raw)
    }
}

/// A `CUdeviceptr` allocated from a memory pool.
///
/// Holds the pool it was allocated from (the pool must outlive the
/// allocation) and the stream its asynchronous free will be ordered on.
/// The stream is read at teardown time, so [`set_stream`] retargets a
/// future free. Dependency edges only ever point from the allocation to
/// the resources it was built from, so the holder graph stays acyclic.
///
/// [`set_stream`]: Deviceptr::set_stream
pub struct Deviceptr {
    raw: RawHandle,
    pool: Holder<MemPool>,
    stream: Mutex<Holder<Stream>>,
}

impl Deviceptr {
    pub(crate) fn new(raw: RawHandle, pool: Holder<MemPool>, stream: Holder<Stream>) -> Self {
        Self {
            raw,
            pool,
            stream: Mutex::new(stream),
        }
    }

    /// The pool this allocation came from.
    pub fn pool(&self) -> Holder<MemPool> {
        self.pool.clone()
    }

    /// The stream the asynchronous free will currently be ordered on.
    pub fn free_stream(&self) -> Holder<Stream> {
        self.stream
            .lock()
            .expect("deviceptr stream holder poisoned")
            .clone()
    }

    /// Retarget the stream used for the asynchronous free.
    pub fn set_stream(&self, stream: Holder<Stream>) {
        let mut held = self.stream.lock().expect("deviceptr stream holder poisoned");
        // `stream` is alive before the previously held reference drops, so
        // a shared transitive target never dips to zero owners here.
        *held = stream;
    }
}

impl Resource for Deviceptr {
    const KIND: ResourceKind = ResourceKind::Deviceptr;

    fn sentinel() -> Self {
        Self::new(RawHandle::NULL, Holder::sentinel(), Holder::sentinel())
    }

    fn raw(&self) -> RawHandle {
        self.raw
    }

    fn teardown(&self, driver: &dyn Driver) -> Result<(), DriverError> {
        driver.free_async(self.raw, self.free_stream().value())
    }
}

macro_rules! display_as_driver_type {
    ($($ty:ty),+) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}={}", Self::KIND.driver_type(), self.raw())
            }
        }
    )+};
}

display_as_driver_type!(Stream, MemPool, Deviceptr);

/// Holder aliases, named like the boxes with `Holder` appended.
pub type StreamHolder = Holder<Stream>;
pub type MemPoolHolder = Holder<MemPool>;
pub type DeviceptrHolder = Holder<Deviceptr>;

impl Holder<Deviceptr> {
    /// Retarget the stream used for the referenced allocation's free.
    ///
    /// Visible through every holder of the box, including cached ones.
    pub fn set_stream(&self, stream: StreamHolder) {
        self.resource().set_stream(stream);
    }
}

//! Boundary to the CUDA driver.
//!
//! The core never interprets a driver handle - it only stores the bit
//! pattern and passes it back to the driver's teardown entry points. A
//! [`Driver`] implementation (the FFI adapter, or a mock in tests) is the
//! only place allowed to reinterpret a [`RawHandle`] as a native
//! `CUstream`, `CUmemoryPool` or `CUdeviceptr`.

use std::fmt;

use thiserror::Error;

/// Opaque driver handle token.
///
/// Wide enough for both pointer-shaped handles (`CUstream`,
/// `CUmemoryPool`) and integer handles (`CUdeviceptr`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(u64);

impl RawHandle {
    /// The null handle, sentinel value for pools and device pointers.
    pub const NULL: RawHandle = RawHandle(0);

    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle(0x{:x})", self.0)
    }
}

/// The driver's `CU_STREAM_PER_THREAD` token.
///
/// A valid, globally provided default stream. Sentinel value for stream
/// boxes, so a reset stream holder still denotes a usable stream.
pub const STREAM_PER_THREAD: RawHandle = RawHandle::from_raw(0x2);

/// A non-success status reported by a driver call.
///
/// Carries the numeric `CUresult` code and the driver's own description
/// (what `cuGetErrorString` returned for it).
#[derive(Debug, Clone, Error)]
#[error("CUDA error {code}: {message}")]
pub struct DriverError {
    pub code: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Teardown capability of the driver, one entry point per resource kind.
///
/// Teardown may be invoked from whichever thread drops the last holder of
/// a resource; implementations must tolerate that. None of these calls are
/// assumed idempotent - the holder machinery guarantees each fires at most
/// once per captured resource.
pub trait Driver: Send + Sync + 'static {
    /// `cuStreamDestroy`.
    fn destroy_stream(&self, stream: RawHandle) -> Result<(), DriverError>;

    /// `cuMemPoolDestroy`.
    fn destroy_mem_pool(&self, pool: RawHandle) -> Result<(), DriverError>;

    /// `cuMemFreeAsync` - frees `ptr`, ordered on `stream`.
    fn free_async(&self, ptr: RawHandle, stream: RawHandle) -> Result<(), DriverError>;
}

//! Shared test driver that records every teardown call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cuda_holders::{Driver, DriverError, RawHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownCall {
    DestroyStream(u64),
    DestroyMemPool(u64),
    FreeAsync { ptr: u64, stream: u64 },
}

/// Records teardown calls in order; can be switched to fail them.
#[derive(Default)]
pub struct RecordingDriver {
    calls: Mutex<Vec<TeardownCall>>,
    fail: AtomicBool,
}

impl RecordingDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent teardown call report a driver failure.
    pub fn fail_teardowns(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TeardownCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: TeardownCall) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            Err(DriverError::new(709, "context is destroyed"))
        } else {
            Ok(())
        }
    }
}

impl Driver for RecordingDriver {
    fn destroy_stream(&self, stream: RawHandle) -> Result<(), DriverError> {
        self.record(TeardownCall::DestroyStream(stream.as_raw()))
    }

    fn destroy_mem_pool(&self, pool: RawHandle) -> Result<(), DriverError> {
        self.record(TeardownCall::DestroyMemPool(pool.as_raw()))
    }

    fn free_async(&self, ptr: RawHandle, stream: RawHandle) -> Result<(), DriverError> {
        self.record(TeardownCall::FreeAsync {
            ptr: ptr.as_raw(),
            stream: stream.as_raw(),
        })
    }
}

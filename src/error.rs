//! Error types and the drop-path error side channel.

use std::sync::Mutex;

use thiserror::Error;

use crate::driver::{DriverError, RawHandle};
use crate::resource::ResourceKind;

/// Errors surfaced by the holder machinery.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The driver reported a non-success status while releasing a resource.
    ///
    /// The resource box is released regardless - teardown is never retried.
    #[error("failed to release {kind} {handle}: {source}")]
    Teardown {
        kind: ResourceKind,
        handle: RawHandle,
        source: DriverError,
    },
}

/// Side channel for teardown failures that occur during implicit drop.
///
/// Teardown runs when the last holder of an owned box is dropped. Drop is
/// not a fallible call site, so a failure there cannot propagate as a
/// `Result`; it is logged and recorded here instead. Callers that want the
/// failure as a `Result` should use [`Holder::close`] before dropping.
///
/// The slot keeps the first unread failure; later failures are logged but
/// not recorded until the slot is drained with [`take`].
///
/// [`Holder::close`]: crate::holder::Holder::close
/// [`take`]: TeardownErrorSlot::take
#[derive(Debug, Default)]
pub struct TeardownErrorSlot {
    slot: Mutex<Option<Error>>,
}

impl TeardownErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure, unless an earlier one is still unread.
    pub fn record(&self, err: Error) {
        let mut slot = self.slot.lock().expect("teardown error slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Take the oldest unread failure, if any.
    pub fn take(&self) -> Option<Error> {
        self.slot
            .lock()
            .expect("teardown error slot poisoned")
            .take()
    }
}

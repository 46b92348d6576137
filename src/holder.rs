//! Shared-ownership holders over resource boxes.
//!
//! A [`Holder`] is a cloneable reference to one resource box. The box lives
//! as long as its longest-lived holder; when the last holder drops, an
//! attached finalizer (if any) runs the driver teardown call exactly once.
//!
//! ## Owned vs borrowed
//!
//! An *owned* holder carries a finalizer and is responsible for releasing
//! the driver resource. A *borrowed* holder wraps a handle the process does
//! not own (the per-thread default stream, a handle owned by other code)
//! and never triggers teardown, no matter how many times it is cloned or
//! dropped. There is no transition between the two: ownership is fixed at
//! capture time.
//!
//! ## Teardown failures
//!
//! Teardown usually runs inside `Drop`, which cannot return a `Result`. The
//! explicit [`Holder::close`] path is therefore the recommended way to
//! release a resource when the caller wants the driver status: if the
//! holder is the last owner, `close` runs teardown immediately and returns
//! its outcome. The implicit drop path is the fallback - a failure there is
//! logged and recorded in the registry's [`TeardownErrorSlot`], never
//! panicked out of `Drop`. The box's memory is released on every path,
//! whether or not the driver call succeeded.
//!
//! [`TeardownErrorSlot`]: crate::error::TeardownErrorSlot

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use crate::diagnostics::Usage;
use crate::driver::{Driver, RawHandle};
use crate::error::{Error, TeardownErrorSlot};
use crate::resource::Resource;

/// Everything a finalizer needs at teardown time.
///
/// Captured once per owned box; its presence is what makes a box owned.
pub(crate) struct Finalizer {
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) usage: Arc<Usage>,
    pub(crate) errors: Arc<TeardownErrorSlot>,
}

impl Finalizer {
    /// Run the teardown call for `resource`, consuming the finalizer.
    fn run<R: Resource>(self, resource: &R) -> Result<(), Error> {
        self.usage.on_release(R::KIND);
        tracing::debug!("Releasing {} {}", R::KIND, resource.raw());
        resource
            .teardown(&*self.driver)
            .map_err(|source| Error::Teardown {
                kind: R::KIND,
                handle: resource.raw(),
                source,
            })
    }
}

/// One resource box plus its ownership tag.
///
/// `finalizer` is `Some` for owned boxes and `None` for borrowed and
/// sentinel boxes. It is taken out exactly once, by `close` or by `Drop`,
/// so teardown can never run twice.
pub(crate) struct Slot<R: Resource> {
    resource: R,
    finalizer: Option<Finalizer>,
}

impl<R: Resource> Drop for Slot<R> {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            let errors = Arc::clone(&finalizer.errors);
            if let Err(err) = finalizer.run(&self.resource) {
                // Drop cannot propagate; log and park the error for the
                // caller to collect.
                tracing::error!("{}", err);
                errors.record(err);
            }
        }
    }
}

/// Shared-ownership handle to a resource box.
///
/// Cloning adds an owner; dropping removes one. A holder is never empty:
/// after [`reset`] or [`close`] it references a fresh sentinel box for its
/// kind and remains fully usable.
///
/// [`reset`]: Holder::reset
/// [`close`]: Holder::close
pub struct Holder<R: Resource> {
    inner: Arc<Slot<R>>,
}

impl<R: Resource> Clone for Holder<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> Default for Holder<R> {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl<R: Resource> Holder<R> {
    /// Owning capture: attach a finalizer that will release the resource
    /// when the last holder drops.
    pub(crate) fn owned(resource: R, finalizer: Finalizer) -> Self {
        finalizer.usage.on_capture(R::KIND);
        tracing::debug!("Capturing {} {}", R::KIND, resource.raw());
        Self {
            inner: Arc::new(Slot {
                resource,
                finalizer: Some(finalizer),
            }),
        }
    }

    /// Non-owning wrap of an externally-managed resource. Dropping the
    /// returned holder never invokes teardown.
    pub fn borrowed(resource: R) -> Self {
        tracing::debug!("Wrapping borrowed {} {}", R::KIND, resource.raw());
        Self {
            inner: Arc::new(Slot {
                resource,
                finalizer: None,
            }),
        }
    }

    /// A holder over the kind's sentinel box ("no resource").
    pub fn sentinel() -> Self {
        Self {
            inner: Arc::new(Slot {
                resource: R::sentinel(),
                finalizer: None,
            }),
        }
    }

    /// The raw driver handle of the referenced box.
    pub fn value(&self) -> RawHandle {
        self.inner.resource.raw()
    }

    /// The referenced resource box.
    pub fn resource(&self) -> &R {
        &self.inner.resource
    }

    /// Whether a finalizer is attached to the referenced box.
    pub fn is_owned(&self) -> bool {
        self.inner.finalizer.is_some()
    }

    /// Whether two holders reference the same box.
    pub fn same_box(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of holders currently referencing the box.
    ///
    /// Approximate under concurrent cloning; exact in single-threaded use.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Drop this reference and point the holder at a fresh sentinel box.
    ///
    /// If this was the last reference to an owned box, its finalizer runs
    /// here (failures go through the drop-path side channel). Idempotent:
    /// resetting a sentinel-referencing holder is a no-op beyond swapping
    /// sentinels.
    pub fn reset(&mut self) {
        self.inner = Self::sentinel().inner;
    }

    /// Release this reference, running teardown now if it is the last one.
    ///
    /// The primary, fallible teardown path: unlike [`reset`], a driver
    /// failure is returned to the caller instead of going through the
    /// side channel. When other holders still reference the box, this is
    /// equivalent to `reset` and returns `Ok(())` - teardown stays with
    /// whoever drops last. The holder references a sentinel box afterward.
    ///
    /// [`reset`]: Holder::reset
    pub fn close(&mut self) -> Result<(), Error> {
        let prior = mem::replace(&mut self.inner, Self::sentinel().inner);
        match Arc::try_unwrap(prior) {
            Ok(mut slot) => match slot.finalizer.take() {
                Some(finalizer) => finalizer.run(&slot.resource),
                None => Ok(()),
            },
            // Other holders remain; the last of them finalizes.
            Err(_still_shared) => Ok(()),
        }
    }

    /// Weak reference for the dedup cache. Does not keep the box alive.
    pub(crate) fn downgrade(&self) -> Weak<Slot<R>> {
        Arc::downgrade(&self.inner)
    }

    /// Re-materialize a holder from a cache entry, if the box is still live.
    pub(crate) fn from_weak(weak: &Weak<Slot<R>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl<R: Resource + fmt::Display> fmt::Display for Holder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.resource.fmt(f)
    }
}

impl<R: Resource> fmt::Debug for Holder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Holder")
            .field("kind", &R::KIND)
            .field("value", &self.value())
            .field("owned", &self.is_owned())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, STREAM_PER_THREAD};
    use crate::resource::Stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDriver {
        destroyed: AtomicUsize,
    }

    impl CountingDriver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                destroyed: AtomicUsize::new(0),
            })
        }
    }

    impl Driver for CountingDriver {
        fn destroy_stream(&self, _stream: RawHandle) -> Result<(), DriverError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy_mem_pool(&self, _pool: RawHandle) -> Result<(), DriverError> {
            Ok(())
        }

        fn free_async(&self, _ptr: RawHandle, _stream: RawHandle) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn finalizer(driver: &Arc<CountingDriver>) -> Finalizer {
        Finalizer {
            driver: Arc::clone(driver) as Arc<dyn Driver>,
            usage: Arc::new(Usage::new()),
            errors: Arc::new(TeardownErrorSlot::new()),
        }
    }

    #[test]
    fn sentinel_holder_is_valid_and_unowned() {
        let holder: Holder<Stream> = Holder::sentinel();
        assert_eq!(holder.value(), STREAM_PER_THREAD);
        assert!(!holder.is_owned());
    }

    #[test]
    fn clone_shares_the_box() {
        let driver = CountingDriver::new();
        let holder = Holder::owned(Stream::new(RawHandle::from_raw(0x1000)), finalizer(&driver));
        let copy = holder.clone();

        assert!(holder.same_box(&copy));
        assert_eq!(holder.ref_count(), 2);
        drop(copy);
        assert_eq!(holder.ref_count(), 1);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn last_drop_runs_teardown_once() {
        let driver = CountingDriver::new();
        let holder = Holder::owned(Stream::new(RawHandle::from_raw(0x1000)), finalizer(&driver));
        let copy = holder.clone();

        drop(holder);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 0);
        drop(copy);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_is_idempotent() {
        let driver = CountingDriver::new();
        let mut holder =
            Holder::owned(Stream::new(RawHandle::from_raw(0x1000)), finalizer(&driver));

        holder.reset();
        assert_eq!(holder.value(), STREAM_PER_THREAD);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 1);

        holder.reset();
        assert_eq!(holder.value(), STREAM_PER_THREAD);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn borrowed_holder_never_tears_down() {
        let mut holder = Holder::borrowed(Stream::new(RawHandle::from_raw(0x2)));
        let copy = holder.clone();
        drop(copy);
        holder.reset();
        assert!(holder.close().is_ok());
        // No driver involved at any point: borrowed holders hold none.
    }

    #[test]
    fn close_on_last_owner_runs_teardown_now() {
        let driver = CountingDriver::new();
        let mut holder =
            Holder::owned(Stream::new(RawHandle::from_raw(0x1000)), finalizer(&driver));

        assert!(holder.close().is_ok());
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(holder.value(), STREAM_PER_THREAD);

        // Second close is a sentinel no-op.
        assert!(holder.close().is_ok());
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_defers_to_remaining_owners() {
        let driver = CountingDriver::new();
        let mut holder =
            Holder::owned(Stream::new(RawHandle::from_raw(0x1000)), finalizer(&driver));
        let copy = holder.clone();

        assert!(holder.close().is_ok());
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 0);

        drop(copy);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 1);
    }
}

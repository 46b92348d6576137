//! Deduplicating weak-reference cache, one per resource kind.
//!
//! The driver can hand back the same raw handle from several call sites
//! while the resource is still live. Capturing it twice as owned would
//! register two finalizers and tear the resource down twice. The cache
//! makes owned capture idempotent for a live handle: a repeated lookup
//! returns another holder of the existing box instead of a competing one.
//!
//! Entries are weak, so the cache never extends a resource's lifetime. An
//! entry whose box has been torn down is treated as absent and overwritten
//! by the next capture of that raw handle - the cache self-heals on access
//! and needs no sweep pass. This also makes handle reuse by the driver
//! safe: once a handle is fully released, a new capture of the same bits
//! gets a fresh box.

use std::collections::HashMap;
use std::sync::{Mutex, Weak};

use crate::driver::RawHandle;
use crate::holder::{Holder, Slot};
use crate::resource::Resource;

/// Raw handle → weak reference to a live holder's box.
pub struct HolderCache<R: Resource> {
    entries: Mutex<HashMap<u64, Weak<Slot<R>>>>,
}

impl<R: Resource> Default for HolderCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> HolderCache<R> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return a holder for `raw`, capturing only if no live one exists.
    ///
    /// Lookup, capture and insert form one critical section: two threads
    /// racing on the same raw handle cannot both construct an owned box.
    /// `capture` runs under the cache lock and must not call back into
    /// this cache.
    pub fn get_or_capture<F>(&self, raw: RawHandle, capture: F) -> Holder<R>
    where
        F: FnOnce() -> Holder<R>,
    {
        let mut entries = self.entries.lock().expect("holder cache poisoned");

        if let Some(weak) = entries.get(&raw.as_raw()) {
            if let Some(holder) = Holder::from_weak(weak) {
                tracing::debug!("Returning cached {} {}", R::KIND, raw);
                return holder;
            }
            tracing::trace!("Stale cache entry for {} {}", R::KIND, raw);
        }

        let holder = capture();
        entries.insert(raw.as_raw(), holder.downgrade());
        holder
    }

    /// Number of entries whose box is still live. Stale entries linger
    /// until the next capture of their handle, so this is the meaningful
    /// size, not the map length.
    pub fn live_len(&self) -> usize {
        self.entries
            .lock()
            .expect("holder cache poisoned")
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl<R: Resource> std::fmt::Debug for HolderCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HolderCache")
            .field("kind", &R::KIND)
            .field("live_len", &self.live_len())
            .finish()
    }
}

//! Per-kind live-resource counters.
//!
//! Pure observer: the counters consume capture/release events and are not
//! required for correctness. Borrowed wraps are not counted - they do not
//! represent driver resources this crate is responsible for.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::resource::ResourceKind;

/// Live counts of captured driver resources, per kind.
#[derive(Debug, Default)]
pub struct Usage {
    streams: AtomicI64,
    mem_pools: AtomicI64,
    deviceptrs: AtomicI64,
}

impl Usage {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, kind: ResourceKind) -> &AtomicI64 {
        match kind {
            ResourceKind::Stream => &self.streams,
            ResourceKind::MemPool => &self.mem_pools,
            ResourceKind::Deviceptr => &self.deviceptrs,
        }
    }

    /// An owned capture happened.
    pub fn on_capture(&self, kind: ResourceKind) {
        self.counter(kind).fetch_add(1, Ordering::Relaxed);
    }

    /// A finalizer ran.
    pub fn on_release(&self, kind: ResourceKind) {
        self.counter(kind).fetch_sub(1, Ordering::Relaxed);
    }

    /// Current live count for one kind.
    pub fn live(&self, kind: ResourceKind) -> i64 {
        self.counter(kind).load(Ordering::Relaxed)
    }

    /// Render the usage report block.
    pub fn report(&self) -> String {
        self.to_string()
    }

    /// Emit the usage report through tracing.
    pub fn log_report(&self) {
        tracing::info!("\n{}", self);
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CUDA Resource Usage Report\n\
             ==========================\n\
             Currently in use:\n\
             \x20   #streams : {}\n\
             \x20   #mempools: {}\n\
             \x20   #devptrs : {}",
            self.live(ResourceKind::Stream),
            self.live(ResourceKind::MemPool),
            self.live(ResourceKind::Deviceptr),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_capture_and_release() {
        let usage = Usage::new();
        usage.on_capture(ResourceKind::Stream);
        usage.on_capture(ResourceKind::Stream);
        usage.on_capture(ResourceKind::MemPool);
        usage.on_release(ResourceKind::Stream);

        assert_eq!(usage.live(ResourceKind::Stream), 1);
        assert_eq!(usage.live(ResourceKind::MemPool), 1);
        assert_eq!(usage.live(ResourceKind::Deviceptr), 0);
    }

    #[test]
    fn report_lists_all_kinds() {
        let usage = Usage::new();
        usage.on_capture(ResourceKind::Deviceptr);

        let report = usage.report();
        assert!(report.contains("#streams : 0"));
        assert!(report.contains("#mempools: 0"));
        assert!(report.contains("#devptrs : 1"));
    }
}

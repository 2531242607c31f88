use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Failure bookkeeping of one upstream.
///
/// `fails` grows with every failed query or probe and drops back to zero on
/// the first successful probe. At most one probe loop runs at a time.
#[derive(Debug)]
pub struct UpstreamHealth {
    fails: AtomicU32,
    probing: AtomicBool,
    probe_interval_ms: AtomicU64,
}

impl UpstreamHealth {
    pub fn new(probe_interval: Duration) -> Self {
        Self {
            fails: AtomicU32::new(0),
            probing: AtomicBool::new(false),
            probe_interval_ms: AtomicU64::new(probe_interval.as_millis() as u64),
        }
    }

    pub fn fails(&self) -> u32 {
        self.fails.load(Ordering::Relaxed)
    }

    /// `max_fails == 0` disables the threshold.
    pub fn is_down(&self, max_fails: u32) -> bool {
        max_fails != 0 && self.fails() > max_fails
    }

    pub fn mark_failed(&self, server: &str) -> u32 {
        let previous = self
            .fails
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |f| {
                Some(f.saturating_add(1))
            })
            .unwrap_or_else(|f| f);
        let fails = previous.saturating_add(1);
        if fails == 1 {
            warn!(server = %server, "Upstream started failing");
        }
        fails
    }

    pub fn mark_healthy(&self, server: &str) {
        let previous = self.fails.swap(0, Ordering::Relaxed);
        if previous > 0 {
            info!(server = %server, previous_fails = previous, "Upstream healthy again");
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_probe_interval(&self, interval: Duration) {
        self.probe_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    /// Claims the single probe slot; false when a probe loop already runs.
    pub fn try_begin_probe(&self) -> bool {
        self.probing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_probe(&self) {
        self.probing.store(false, Ordering::Release);
    }

    pub fn is_probing(&self) -> bool {
        self.probing.load(Ordering::Acquire)
    }
}

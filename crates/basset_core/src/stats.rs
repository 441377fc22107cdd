//! Loader invocation counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-scoped counters, updated lock-free from every resolve.
#[derive(Debug, Default)]
pub struct LoaderStats {
    total_calls: AtomicU64,
    total_nanos: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
    transform_failures: AtomicU64,
}

/// Point-in-time copy of [`LoaderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_calls: u64,
    pub total_time: Duration,
    pub hits: u64,
    pub misses: u64,
    pub fallbacks: u64,
    pub transform_failures: u64,
}

impl LoaderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing one invocation.
    ///
    /// The call is counted when the returned guard drops, so a resolve that is
    /// cancelled mid-flight is still counted.
    pub fn start_call(&self) -> CallTimer<'_> {
        CallTimer {
            stats: self,
            started: Instant::now(),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transform_failure(&self) {
        self.transform_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_time: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed)),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
        }
    }
}

/// Guard returned by [`LoaderStats::start_call`].
#[derive(Debug)]
pub struct CallTimer<'a> {
    stats: &'a LoaderStats,
    started: Instant,
}

impl Drop for CallTimer<'_> {
    fn drop(&mut self) {
        let nanos = u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.stats.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.stats.total_calls.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Basset run {} times, with an execution time of {:?}",
            self.total_calls, self.total_time
        )
    }
}

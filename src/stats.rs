//! Flow-control statistics and the observers that receive them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of the two flow-control counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatistics {
    /// Render periods that could not be filled from the buffer.
    pub exhaust_count: u64,
    /// Pushes rejected because the buffer could not take them.
    pub full_count: u64,
}

/// Receives statistics after every push, reset and pull.
///
/// Called on whichever thread performed the operation, including the render thread,
/// so implementations must not block or allocate.
pub trait StatisticsObserver: Send + Sync {
    fn publish(&self, stats: FlowStatistics);
}

impl<F> StatisticsObserver for F
where
    F: Fn(FlowStatistics) + Send + Sync,
{
    fn publish(&self, stats: FlowStatistics) {
        self(stats)
    }
}

/// Latest-value cell for monitors that read statistics on their own schedule.
///
/// The two counters are stored independently; a reader racing two publications may
/// see each field from a different one, but never a value older than the last
/// completed publication.
#[derive(Debug, Default)]
pub struct StatisticsMailbox {
    exhaust_count: AtomicU64,
    full_count: AtomicU64,
    updates: AtomicU64,
}

impl StatisticsMailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn latest(&self) -> FlowStatistics {
        FlowStatistics {
            exhaust_count: self.exhaust_count.load(Ordering::Acquire),
            full_count: self.full_count.load(Ordering::Acquire),
        }
    }

    /// Number of publications received so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }
}

impl StatisticsObserver for StatisticsMailbox {
    fn publish(&self, stats: FlowStatistics) {
        self.exhaust_count.store(stats.exhaust_count, Ordering::Release);
        self.full_count.store(stats.full_count, Ordering::Release);
        self.updates.fetch_add(1, Ordering::AcqRel);
    }
}

/// Counters shared by both halves of a flow buffer.
///
/// `exhaust` is only incremented by the render side and `full` only by the producer;
/// `reset` may race either increment, which is acceptable.
#[derive(Debug, Default)]
pub(crate) struct FlowCounters {
    exhaust: AtomicU64,
    full: AtomicU64,
}

impl FlowCounters {
    pub(crate) fn record_exhaust(&self) {
        self.exhaust.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_full(&self) {
        self.full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.exhaust.store(0, Ordering::Relaxed);
        self.full.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FlowStatistics {
        FlowStatistics {
            exhaust_count: self.exhaust.load(Ordering::Relaxed),
            full_count: self.full.load(Ordering::Relaxed),
        }
    }
}

//! Producer half of the flow buffer and the shared state behind both halves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use ringbuf::traits::{Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};

use super::render::FlowConsumer;
use crate::config::{ConfigError, FlowConfig, MAX_PUSH_CHUNK_SAMPLES};
use crate::stats::{FlowCounters, FlowStatistics, StatisticsObserver};

/// State visible to both the producer and the render side.
pub(crate) struct Shared {
    pub(crate) config: FlowConfig,
    pub(crate) counters: FlowCounters,
    /// Mirror of the render side's underflow latch, written only by the render side.
    pub(crate) underflowed: AtomicBool,
    /// Set once the render side has been dropped.
    pub(crate) closed: AtomicBool,
    observer: Option<Arc<dyn StatisticsObserver>>,
}

impl Shared {
    pub(crate) fn publish(&self) {
        if let Some(observer) = &self.observer {
            observer.publish(self.counters.snapshot());
        }
    }
}

/// Result of a single [`FlowProducer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Every sample was appended.
    Accepted,
    /// Nothing was appended and `full_count` was incremented.
    Rejected,
}

impl PushOutcome {
    pub fn is_accepted(self) -> bool {
        self == PushOutcome::Accepted
    }
}

/// Summary of a [`FlowProducer::push_chunked`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkedPush {
    pub accepted: usize,
    pub rejected: usize,
}

impl ChunkedPush {
    pub fn is_complete(&self) -> bool {
        self.rejected == 0
    }
}

/// A bounded FIFO of interleaved samples connecting a producer to a render callback.
///
/// Use it directly when both sides run on the same thread (an AudioWorklet, a test),
/// or [`split`](Self::split) it into a [`FlowProducer`] and a [`FlowConsumer`] to hand
/// each side to its own context. The sample storage is a lock-free SPSC ring
/// preallocated to `capacity_frames * channel_count` samples.
pub struct FlowBuffer {
    producer: FlowProducer,
    consumer: FlowConsumer,
}

impl FlowBuffer {
    pub fn new(config: FlowConfig) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    /// Like [`new`](Self::new), publishing statistics to `observer` after every
    /// push, reset and pull.
    pub fn with_observer(
        config: FlowConfig,
        observer: Arc<dyn StatisticsObserver>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Some(observer))
    }

    fn build(
        config: FlowConfig,
        observer: Option<Arc<dyn StatisticsObserver>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        debug!(
            "flow buffer: {} frames capacity, {} frames low water, {} channel(s) at {} Hz",
            config.capacity_frames,
            config.low_water_frames,
            config.channel_count,
            config.sample_rate
        );

        let shared = Arc::new(Shared {
            config,
            counters: FlowCounters::default(),
            underflowed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            observer,
        });

        let (ring_producer, ring_consumer) = HeapRb::<f32>::new(config.capacity_samples()).split();

        Ok(Self {
            producer: FlowProducer {
                ring: ring_producer,
                shared: Arc::clone(&shared),
            },
            consumer: FlowConsumer::new(ring_consumer, shared),
        })
    }

    pub fn split(self) -> (FlowProducer, FlowConsumer) {
        (self.producer, self.consumer)
    }

    pub fn consumer(&mut self) -> &mut FlowConsumer {
        &mut self.consumer
    }

    pub fn config(&self) -> &FlowConfig {
        &self.producer.shared.config
    }

    pub fn push(&mut self, samples: &[f32]) -> PushOutcome {
        self.producer.push(samples)
    }

    pub fn push_chunked(&mut self, samples: &[f32]) -> ChunkedPush {
        self.producer.push_chunked(samples)
    }

    pub fn reset_statistics(&self) {
        self.producer.reset_statistics();
    }

    pub fn statistics(&self) -> FlowStatistics {
        self.producer.statistics()
    }

    pub fn buffered_samples(&self) -> usize {
        self.producer.buffered_samples()
    }

    pub fn buffered_frames(&self) -> usize {
        self.producer.buffered_frames()
    }

    pub fn is_underflowed(&self) -> bool {
        self.consumer.is_underflowed()
    }
}

/// Producer half: appends samples and manages statistics.
pub struct FlowProducer {
    ring: HeapProd<f32>,
    shared: Arc<Shared>,
}

impl FlowProducer {
    /// Append `samples` (interleaved) as a unit.
    ///
    /// The call is admitted only if the buffer is below capacity and the whole payload
    /// fits; otherwise nothing is stored and `full_count` is incremented. Never blocks.
    pub fn push(&mut self, samples: &[f32]) -> PushOutcome {
        let capacity = self.shared.config.capacity_samples();
        // The render side can only free space concurrently, so this is conservative.
        let occupied = self.ring.occupied_len();

        let outcome = if occupied < capacity && occupied + samples.len() <= capacity {
            let pushed = self.ring.push_slice(samples);
            debug_assert_eq!(pushed, samples.len());
            PushOutcome::Accepted
        } else {
            self.shared.counters.record_full();
            trace!(
                "push of {} samples rejected ({} of {} buffered)",
                samples.len(),
                occupied,
                capacity
            );
            PushOutcome::Rejected
        };

        self.shared.publish();
        outcome
    }

    /// Push a large payload as a sequence of bounded chunks.
    ///
    /// Chunks hold at most [`MAX_PUSH_CHUNK_SAMPLES`] samples, rounded down to whole
    /// frames, and each one is admitted or rejected on its own.
    pub fn push_chunked(&mut self, samples: &[f32]) -> ChunkedPush {
        let channels = self.shared.config.channel_count;
        let chunk_len = (MAX_PUSH_CHUNK_SAMPLES / channels * channels).max(channels);

        let mut summary = ChunkedPush::default();
        if samples.len() <= chunk_len {
            match self.push(samples) {
                PushOutcome::Accepted => summary.accepted += 1,
                PushOutcome::Rejected => summary.rejected += 1,
            }
            return summary;
        }

        for chunk in samples.chunks(chunk_len) {
            match self.push(chunk) {
                PushOutcome::Accepted => summary.accepted += 1,
                PushOutcome::Rejected => summary.rejected += 1,
            }
        }
        summary
    }

    /// Zero both counters. Buffered samples and the underflow latch are untouched.
    pub fn reset_statistics(&self) {
        self.shared.counters.reset();
        self.shared.publish();
    }

    pub fn statistics(&self) -> FlowStatistics {
        self.shared.counters.snapshot()
    }

    pub fn buffered_samples(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffered_samples() / self.shared.config.channel_count
    }

    /// Free space in samples as seen from the producer.
    pub fn vacant_samples(&self) -> usize {
        self.shared
            .config
            .capacity_samples()
            .saturating_sub(self.ring.occupied_len())
    }

    pub fn is_underflowed(&self) -> bool {
        self.shared.underflowed.load(Ordering::Acquire)
    }

    /// True once the render side has been torn down.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &FlowConfig {
        &self.shared.config
    }
}

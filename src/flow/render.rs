//! Render half of the flow buffer: the per-period pull with underflow hysteresis.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::debug;
use ringbuf::traits::{Consumer, Observer};
use ringbuf::HeapCons;

use super::buffer::Shared;
use crate::stats::FlowStatistics;

/// What a single pull did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// `frame_count` was zero; nothing happened.
    Skipped,
    /// The whole block came from the buffer.
    Delivered,
    /// The buffer ran dry part way; `copied_samples` came from it, the rest is silence.
    Underflow { copied_samples: usize },
    /// Still refilling after an earlier underflow; the block is silent and nothing
    /// was consumed.
    Holding,
}

impl PullOutcome {
    /// True when this pull counted as an exhaustion event.
    pub fn is_exhausted(self) -> bool {
        matches!(self, PullOutcome::Underflow { .. } | PullOutcome::Holding)
    }
}

/// Preallocated planar scratch block for hosts that interleave on their own.
///
/// Channel `c` occupies `data[c * frames..(c + 1) * frames]`.
#[derive(Debug, Clone)]
pub struct RenderBlock {
    data: Vec<f32>,
    channels: usize,
    max_frames: usize,
    frames: usize,
}

impl RenderBlock {
    pub fn new(channels: usize, max_frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            data: vec![0.0; channels * max_frames],
            channels,
            max_frames,
            frames: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames written by the last pull.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        assert!(
            channel < self.channels,
            "channel {} out of range for a {}-channel block",
            channel,
            self.channels
        );
        let start = channel * self.frames;
        &self.data[start..start + self.frames]
    }

    pub fn as_planar(&self) -> &[f32] {
        &self.data[..self.channels * self.frames]
    }
}

/// Render half: called once per render period, never blocks.
///
/// Dropping it tears the stream down; the producer sees this through
/// [`FlowProducer::is_closed`](super::FlowProducer::is_closed).
pub struct FlowConsumer {
    ring: HeapCons<f32>,
    shared: Arc<Shared>,
    channels: usize,
    low_water_samples: usize,
    underflowed: bool,
}

impl FlowConsumer {
    pub(crate) fn new(ring: HeapCons<f32>, shared: Arc<Shared>) -> Self {
        let channels = shared.config.channel_count;
        let low_water_samples = shared.config.low_water_samples();
        Self {
            ring,
            shared,
            channels,
            low_water_samples,
            underflowed: false,
        }
    }

    /// Drain one block of `frame_count` frames into per-channel `outputs`.
    ///
    /// `outputs` must hold one slice per configured channel, each at least
    /// `frame_count` long. Positions not covered by buffered data are zeroed.
    pub fn pull_into<O: AsMut<[f32]>>(
        &mut self,
        outputs: &mut [O],
        frame_count: usize,
    ) -> PullOutcome {
        debug_assert_eq!(
            outputs.len(),
            self.channels,
            "output channel count does not match the stream"
        );

        if frame_count == 0 {
            return PullOutcome::Skipped;
        }

        for output in outputs.iter_mut() {
            let output = output.as_mut();
            debug_assert!(output.len() >= frame_count);
            let frames = frame_count.min(output.len());
            output[..frames].fill(0.0);
        }

        self.render(frame_count, |channel, frame, sample| {
            if let Some(slot) = outputs
                .get_mut(channel)
                .and_then(|output| output.as_mut().get_mut(frame))
            {
                *slot = sample;
            }
        })
    }

    /// Drain one block into a single channel-major buffer of
    /// `channel_count * frame_count` samples.
    pub fn pull_planar(&mut self, output: &mut [f32], frame_count: usize) -> PullOutcome {
        if frame_count == 0 {
            return PullOutcome::Skipped;
        }

        let needed = frame_count * self.channels;
        debug_assert!(output.len() >= needed);
        let len = needed.min(output.len());
        output[..len].fill(0.0);

        self.render(frame_count, |channel, frame, sample| {
            if let Some(slot) = output.get_mut(channel * frame_count + frame) {
                *slot = sample;
            }
        })
    }

    /// Drain one block into a preallocated [`RenderBlock`].
    pub fn pull_block(&mut self, block: &mut RenderBlock, frame_count: usize) -> PullOutcome {
        debug_assert_eq!(block.channels, self.channels);
        debug_assert!(frame_count <= block.max_frames);

        let frame_count = frame_count.min(block.max_frames);
        block.frames = frame_count;
        let len = frame_count * block.channels;
        self.pull_planar(&mut block.data[..len], frame_count)
    }

    /// Allocating convenience for callers off the render thread.
    pub fn pull(&mut self, frame_count: usize) -> Vec<Vec<f32>> {
        let mut outputs = vec![vec![0.0; frame_count]; self.channels];
        self.pull_into(&mut outputs, frame_count);
        outputs
    }

    fn render<F>(&mut self, frame_count: usize, mut emit: F) -> PullOutcome
    where
        F: FnMut(usize, usize, f32),
    {
        let channels = self.channels;
        let needed = frame_count * channels;
        let available = self.ring.occupied_len();

        if self.underflowed && available < self.low_water_samples {
            self.shared.counters.record_exhaust();
            self.shared.publish();
            return PullOutcome::Holding;
        }

        if self.underflowed {
            debug!("flow buffer refilled to {} samples, resuming", available);
            self.set_underflowed(false);
        }

        let copy_length = available.min(needed);
        let (head, tail) = self.ring.as_slices();
        for (index, &sample) in head.iter().chain(tail.iter()).take(copy_length).enumerate() {
            emit(index % channels, index / channels, sample);
        }
        self.ring.skip(copy_length);

        let outcome = if copy_length < needed {
            self.shared.counters.record_exhaust();
            debug!(
                "flow buffer underflow: {} of {} samples available",
                copy_length, needed
            );
            self.set_underflowed(true);
            PullOutcome::Underflow {
                copied_samples: copy_length,
            }
        } else {
            PullOutcome::Delivered
        };

        self.shared.publish();
        outcome
    }

    fn set_underflowed(&mut self, underflowed: bool) {
        self.underflowed = underflowed;
        self.shared.underflowed.store(underflowed, Ordering::Release);
    }

    pub fn is_underflowed(&self) -> bool {
        self.underflowed
    }

    pub fn buffered_samples(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffered_samples() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn statistics(&self) -> FlowStatistics {
        self.shared.counters.snapshot()
    }
}

impl Drop for FlowConsumer {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

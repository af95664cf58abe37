//! Flow-controlled buffering between a bursty producer and a periodic render callback.
//!
//! | Type | Context | Operations |
//! |------|---------|------------|
//! | [`FlowBuffer`] | either | owns both halves until [`split`](FlowBuffer::split) |
//! | [`FlowProducer`] | producer | `push`, `push_chunked`, `reset_statistics` |
//! | [`FlowConsumer`] | render | `pull_into`, `pull_planar`, `pull_block` |
//!
//! Overflow rejects a whole push and bumps `full_count`. Underflow zero-fills the
//! remainder of the block, bumps `exhaust_count`, and latches the render side silent
//! until the buffer holds at least `low_water_frames` frames again.

mod buffer;
mod render;

pub use buffer::{ChunkedPush, FlowBuffer, FlowProducer, PushOutcome};
pub use render::{FlowConsumer, PullOutcome, RenderBlock};

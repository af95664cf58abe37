pub mod config;
pub mod flow;
pub mod stats;
pub mod utils;
pub mod worklet;

pub use config::{ConfigError, FlowConfig, MAX_PUSH_CHUNK_SAMPLES};
pub use flow::{
    ChunkedPush, FlowBuffer, FlowConsumer, FlowProducer, PullOutcome, PushOutcome, RenderBlock,
};
pub use stats::{FlowStatistics, StatisticsMailbox, StatisticsObserver};
pub use utils::*;
pub use worklet::AudioStream;

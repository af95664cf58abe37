//! AudioWorklet-facing stream handle.
//!
//! In the browser the producer (`port.onmessage`) and the render callback (`process`)
//! run on the same worklet thread, so one [`AudioStream`] owns both halves of the flow
//! buffer. Statistics reach the page through a [`StatisticsMailbox`] that every push,
//! reset and process call updates.

use std::sync::Arc;

use crate::config::FlowConfig;
use crate::flow::FlowBuffer;
use crate::stats::{FlowStatistics, StatisticsMailbox};

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;
#[cfg(feature = "wasm")]
use web_sys::console;

#[cfg(feature = "wasm")]
fn log_console(message: &str) {
    console::log_1(&message.into());
}

#[cfg(not(feature = "wasm"))]
fn log_console(message: &str) {
    log::debug!("{}", message);
}

#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub struct AudioStream {
    flow: FlowBuffer,
    mailbox: Arc<StatisticsMailbox>,
}

#[cfg_attr(feature = "wasm", wasm_bindgen)]
impl AudioStream {
    #[cfg_attr(feature = "wasm", wasm_bindgen(constructor))]
    pub fn new(
        capacity_frames: usize,
        low_water_frames: usize,
        channels: usize,
        sample_rate: f32,
    ) -> Result<AudioStream, String> {
        let config = FlowConfig::new(capacity_frames, low_water_frames, channels, sample_rate);
        let mailbox = StatisticsMailbox::new();
        let flow = FlowBuffer::with_observer(config, mailbox.clone()).map_err(|e| e.to_string())?;

        log_console(&format!(
            "audio stream initialized. sampleRate:{} channels:{}",
            sample_rate, channels
        ));

        Ok(AudioStream { flow, mailbox })
    }

    /// Queue interleaved samples, split into bounded chunks. Returns how many chunks
    /// were rejected because the buffer was full.
    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn push(&mut self, data: &[f32]) -> usize {
        self.flow.push_chunked(data).rejected
    }

    /// Render one quantum into `output`, laid out channel after channel.
    /// Always returns `true` so the worklet node stays alive.
    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn process(&mut self, output: &mut [f32], frame_count: usize) -> bool {
        self.flow.consumer().pull_planar(output, frame_count);
        true
    }

    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn reset_stat(&mut self) {
        self.flow.reset_statistics();
    }

    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn exhaust_count(&self) -> f64 {
        self.mailbox.latest().exhaust_count as f64
    }

    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn full_count(&self) -> f64 {
        self.mailbox.latest().full_count as f64
    }

    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn buffered_frames(&self) -> usize {
        self.flow.buffered_frames()
    }

    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn channels(&self) -> usize {
        self.flow.config().channel_count
    }

    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn sample_rate(&self) -> f32 {
        self.flow.config().sample_rate
    }

    /// `{exhaustCount, fullCount}` as a plain JS object.
    #[cfg(feature = "wasm")]
    #[cfg_attr(feature = "wasm", wasm_bindgen)]
    pub fn stat(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.mailbox.latest()).unwrap_or(JsValue::NULL)
    }
}

impl AudioStream {
    pub fn statistics(&self) -> FlowStatistics {
        self.mailbox.latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_configuration() {
        let err = AudioStream::new(128, 128, 2, 44_100.0).err().unwrap();
        assert!(err.contains("low-water"));
        assert!(AudioStream::new(128, 16, 0, 44_100.0).is_err());
    }

    #[test]
    fn process_renders_planar_quanta() {
        let mut stream = AudioStream::new(256, 4, 2, 44_100.0).unwrap();
        let interleaved: Vec<f32> = (1..=8).flat_map(|i| [i as f32, -(i as f32)]).collect();
        assert_eq!(stream.push(&interleaved), 0);
        assert_eq!(stream.buffered_frames(), 8);

        let mut output = vec![0.0; 8];
        assert!(stream.process(&mut output, 4));
        assert_eq!(output, vec![1.0, 2.0, 3.0, 4.0, -1.0, -2.0, -3.0, -4.0]);
        assert_eq!(stream.buffered_frames(), 4);
    }

    #[test]
    fn statistics_follow_every_call() {
        let mut stream = AudioStream::new(4, 2, 1, 44_100.0).unwrap();

        assert_eq!(stream.push(&[0.5; 8]), 1);
        assert_eq!(stream.full_count(), 1.0);

        let mut output = vec![0.0; 128];
        stream.process(&mut output, 128);
        stream.process(&mut output, 128);
        assert_eq!(stream.exhaust_count(), 2.0);
        assert!(output.iter().all(|&s| s == 0.0));

        stream.reset_stat();
        assert_eq!(stream.statistics(), FlowStatistics::default());
    }

    #[test]
    fn exposes_configuration() {
        let stream = AudioStream::new(64, 8, 2, 48_000.0).unwrap();
        assert_eq!(stream.channels(), 2);
        assert_eq!(stream.sample_rate(), 48_000.0);
        assert_eq!(stream.buffered_frames(), 0);
    }
}

//! Stream configuration
//!
//! Everything here is fixed for the lifetime of a stream. Validation happens once,
//! when the flow buffer is built, so neither side of the buffer re-checks it per call.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default capacity in frames (about 370 ms at 44.1 kHz).
pub const DEFAULT_CAPACITY_FRAMES: usize = 16 * 1024;
/// Default refill threshold in frames after an underflow.
pub const DEFAULT_LOW_WATER_FRAMES: usize = 2 * 1024;
pub const DEFAULT_CHANNEL_COUNT: usize = 1;
pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;

/// Largest number of samples a single chunk of [`push_chunked`] hands to the buffer.
///
/// [`push_chunked`]: crate::flow::FlowProducer::push_chunked
pub const MAX_PUSH_CHUNK_SAMPLES: usize = 48_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("channel count must be at least 1")]
    ZeroChannels,
    #[error("capacity must be at least 1 frame")]
    ZeroCapacity,
    #[error("low-water mark ({low_water_frames} frames) must be below capacity ({capacity_frames} frames)")]
    LowWaterNotBelowCapacity {
        low_water_frames: usize,
        capacity_frames: usize,
    },
    #[error("capacity of {capacity_frames} frames x {channel_count} channels does not fit in memory")]
    CapacityTooLarge {
        capacity_frames: usize,
        channel_count: usize,
    },
    #[error("sample rate must be a positive number, got {0}")]
    InvalidSampleRate(f32),
    #[error("failed to parse stream configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read stream configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration of a single audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowConfig {
    /// Maximum number of frames the buffer may hold.
    pub capacity_frames: usize,
    /// Frames that must be buffered before output resumes after an underflow.
    pub low_water_frames: usize,
    pub channel_count: usize,
    /// Only used to derive the render period; the buffer logic ignores it.
    pub sample_rate: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            capacity_frames: DEFAULT_CAPACITY_FRAMES,
            low_water_frames: DEFAULT_LOW_WATER_FRAMES,
            channel_count: DEFAULT_CHANNEL_COUNT,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl FlowConfig {
    pub fn new(
        capacity_frames: usize,
        low_water_frames: usize,
        channel_count: usize,
        sample_rate: f32,
    ) -> Self {
        Self {
            capacity_frames,
            low_water_frames,
            channel_count,
            sample_rate,
        }
    }

    /// Parse a JSON document such as
    /// `{"capacityFrames": 8192, "lowWaterFrames": 1024, "channelCount": 2}`.
    /// Missing fields take their defaults. The result is validated.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FlowConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if self.capacity_frames == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.capacity_frames.checked_mul(self.channel_count).is_none() {
            return Err(ConfigError::CapacityTooLarge {
                capacity_frames: self.capacity_frames,
                channel_count: self.channel_count,
            });
        }
        if self.low_water_frames >= self.capacity_frames {
            return Err(ConfigError::LowWaterNotBelowCapacity {
                low_water_frames: self.low_water_frames,
                capacity_frames: self.capacity_frames,
            });
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        Ok(())
    }

    /// Only meaningful on a validated config.
    pub fn capacity_samples(&self) -> usize {
        self.capacity_frames * self.channel_count
    }

    pub fn low_water_samples(&self) -> usize {
        self.low_water_frames * self.channel_count
    }

    /// Wall-clock duration of one render block of `frame_count` frames.
    pub fn render_period(&self, frame_count: usize) -> std::time::Duration {
        std::time::Duration::from_secs_f64(frame_count as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FlowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity_samples(), DEFAULT_CAPACITY_FRAMES);
    }

    #[test]
    fn rejects_zero_channels() {
        let config = FlowConfig::new(16, 4, 0, 48_000.0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroChannels)));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = FlowConfig::new(0, 0, 2, 48_000.0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn rejects_low_water_at_or_above_capacity() {
        let config = FlowConfig::new(16, 16, 2, 48_000.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LowWaterNotBelowCapacity {
                low_water_frames: 16,
                capacity_frames: 16
            })
        ));
    }

    #[test]
    fn rejects_capacity_that_overflows_sample_count() {
        let config = FlowConfig::new(usize::MAX / 2 + 1, 0, 4, 48_000.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityTooLarge {
                channel_count: 4,
                ..
            })
        ));

        let json = format!(r#"{{"capacityFrames": {}, "channelCount": 2}}"#, usize::MAX);
        let err = FlowConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, ConfigError::CapacityTooLarge { .. }));
    }

    #[test]
    fn rejects_bad_sample_rate() {
        for rate in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let config = FlowConfig::new(16, 4, 2, rate);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidSampleRate(_))
            ));
        }
    }

    #[test]
    fn parses_json_with_defaults() {
        let config =
            FlowConfig::from_json(r#"{"capacityFrames": 8192, "channelCount": 2}"#).unwrap();
        assert_eq!(config.capacity_frames, 8192);
        assert_eq!(config.low_water_frames, DEFAULT_LOW_WATER_FRAMES);
        assert_eq!(config.channel_count, 2);
        assert_eq!(config.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.capacity_samples(), 16_384);
        assert_eq!(config.low_water_samples(), 4096);
    }

    #[test]
    fn json_is_validated() {
        let err = FlowConfig::from_json(r#"{"capacityFrames": 100, "lowWaterFrames": 200}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::LowWaterNotBelowCapacity { .. }));

        let err = FlowConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn render_period_follows_sample_rate() {
        let config = FlowConfig::new(1024, 128, 2, 48_000.0);
        let period = config.render_period(480);
        assert!((period.as_secs_f64() - 0.01).abs() < 1e-9);
    }
}

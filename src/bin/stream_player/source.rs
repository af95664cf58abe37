//! Producer side of the player: decodes or synthesizes audio and pushes it in bursts.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use audio_stream::{remap_channels, FlowProducer};
use log::{info, warn};

const BURST_FRAMES: usize = 4096;
const BACKOFF: Duration = Duration::from_millis(5);

pub enum Source {
    Wav(PathBuf),
    Tone { frequency: f32, amplitude: f32 },
}

/// Start the producer thread. It runs until the render side is torn down.
pub fn spawn_feeder(
    source: Source,
    producer: FlowProducer,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let channels = producer.config().channel_count;
    let sample_rate = producer.config().sample_rate;

    let samples = match &source {
        Source::Wav(path) => Some(load_wav(path, channels, sample_rate)?),
        Source::Tone { .. } => None,
    };

    let handle = thread::Builder::new()
        .name("stream-feeder".to_string())
        .spawn(move || {
            let mut producer = producer;
            match (source, samples) {
                (_, Some(samples)) => feed_looped(&mut producer, &samples),
                (Source::Tone { frequency, amplitude }, None) => {
                    feed_tone(&mut producer, frequency, amplitude)
                }
                (Source::Wav(path), None) => {
                    anyhow::bail!("no samples decoded from {}", path.display())
                }
            }
            Ok(())
        })
        .context("failed to spawn feeder thread")?;

    Ok(handle)
}

fn burst_samples(producer: &FlowProducer) -> usize {
    let config = producer.config();
    let frames = BURST_FRAMES.min((config.capacity_frames / 2).max(1));
    frames * config.channel_count
}

/// Push one burst, waiting while the buffer has no room for it.
fn push_burst(producer: &mut FlowProducer, burst: &[f32]) -> bool {
    while !producer.is_closed() {
        if producer.vacant_samples() < burst.len() {
            thread::sleep(BACKOFF);
            continue;
        }
        if producer.push_chunked(burst).is_complete() {
            return true;
        }
        thread::sleep(BACKOFF);
    }
    false
}

fn feed_looped(producer: &mut FlowProducer, samples: &[f32]) {
    let burst_len = burst_samples(producer);
    let mut position = 0;

    loop {
        let end = (position + burst_len).min(samples.len());
        if !push_burst(producer, &samples[position..end]) {
            break;
        }
        position = if end == samples.len() { 0 } else { end };
    }
}

fn feed_tone(producer: &mut FlowProducer, frequency: f32, amplitude: f32) {
    let channels = producer.config().channel_count;
    let sample_rate = producer.config().sample_rate;
    let burst_len = burst_samples(producer);
    let phase_step = frequency / sample_rate;

    let mut phase = 0.0f32;
    let mut burst = vec![0.0f32; burst_len];

    loop {
        for frame in burst.chunks_exact_mut(channels) {
            let value = (2.0 * std::f32::consts::PI * phase).sin() * amplitude;
            frame.fill(value);
            phase = (phase + phase_step).fract();
        }
        if !push_burst(producer, &burst) {
            break;
        }
    }
}

/// Decode a WAV file to interleaved f32 in the stream's channel layout.
fn load_wav(path: &Path, channels: usize, sample_rate: f32) -> anyhow::Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let wav_spec = reader.spec();

    let samples: Vec<f32> = match (wav_spec.bits_per_sample, wav_spec.sample_format) {
        (32, hound::SampleFormat::Float) => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()?,
        (16, hound::SampleFormat::Int) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
            .collect::<Result<Vec<f32>, _>>()?,
        (24, hound::SampleFormat::Int) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 8_388_607.0))
            .collect::<Result<Vec<f32>, _>>()?,
        (32, hound::SampleFormat::Int) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / i32::MAX as f32))
            .collect::<Result<Vec<f32>, _>>()?,
        (bits, format) => anyhow::bail!(
            "unsupported WAV format: bits_per_sample={} sample_format={:?}",
            bits,
            format
        ),
    };

    if wav_spec.sample_rate as f32 != sample_rate {
        warn!(
            "{} is {} Hz but the device runs at {} Hz; playback speed will be off",
            path.display(),
            wav_spec.sample_rate,
            sample_rate
        );
    }

    if samples.is_empty() || wav_spec.channels == 0 {
        anyhow::bail!("{} contains no audio", path.display());
    }

    let mut remapped = Vec::new();
    remap_channels(&samples, wav_spec.channels as usize, channels, &mut remapped);

    info!(
        "decoded {}: {} frames, {} channel(s) -> {}",
        path.display(),
        samples.len() / wav_spec.channels as usize,
        wav_spec.channels,
        channels
    );

    Ok(remapped)
}

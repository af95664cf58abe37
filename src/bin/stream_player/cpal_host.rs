//! CPAL-based audio host for native playback
//!
//! This module handles CPAL-specific functionality: device selection,
//! stream configuration, and sample format conversion. The render callback
//! only ever pulls from the flow buffer; it never waits on the producer.

use std::sync::Arc;

use anyhow::Context;
use audio_stream::{
    FlowBuffer, FlowConfig, FlowConsumer, FlowProducer, RenderBlock, StatisticsObserver,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, HostId, Sample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize,
};
use dasp_sample::FromSample;
use log::{debug, error, warn};

// Host callback sizes; larger on ALSA, which underruns easily.
const JACK_HOST_BUFFER: usize = 512;
const ALSA_HOST_BUFFER: usize = 1024;
const DEFAULT_HOST_BUFFER: usize = 512;

// Largest block pulled from the flow buffer per render step.
const RENDER_BLOCK_FRAMES: usize = 1024;

/// Information about an available audio host
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub id: HostId,
    pub name: String,
    pub has_default_device: bool,
}

/// What the device actually gave us
#[derive(Debug, Clone)]
pub struct AudioHostConfig {
    pub flow: FlowConfig,
    pub host_block_frames: Option<usize>,
    pub device_name: String,
    pub host_name: String,
}

/// Audio host that owns the CPAL stream and the render half of the flow buffer
pub struct AudioHost {
    _stream: cpal::Stream,
    config: AudioHostConfig,
}

/// Render-side state moved into the CPAL callback
struct StreamRenderer {
    consumer: FlowConsumer,
    block: RenderBlock,
    call_count: usize,
    starved: bool,
}

impl AudioHost {
    /// List all available audio hosts on the system
    pub fn list_hosts() -> Vec<HostInfo> {
        let mut hosts = Vec::new();

        for host_id in cpal::available_hosts() {
            if let Ok(host) = cpal::host_from_id(host_id) {
                let has_default_device = host.default_output_device().is_some();
                hosts.push(HostInfo {
                    id: host_id,
                    name: host_id.name().to_string(),
                    has_default_device,
                });
            }
        }

        hosts
    }

    /// Open the default output device and start rendering from a new flow buffer.
    ///
    /// `requested` supplies capacity, low-water mark and preferred sample rate; the
    /// channel count and the final sample rate come from the device. Returns the
    /// producer half for the caller to feed.
    pub fn new(
        requested: FlowConfig,
        observer: Arc<dyn StatisticsObserver>,
        preferred_host: Option<&str>,
    ) -> anyhow::Result<(Self, FlowProducer)> {
        let preferred_rate = requested.sample_rate.round() as u32;
        let (device, config, sample_format, host_name, buffer_range) =
            select_output_device(preferred_host, preferred_rate)?;

        if let Some((min, max)) = buffer_range {
            debug!("device buffer size range: {}..={} frames", min, max);
        }

        let host_block_frames = match config.buffer_size {
            BufferSize::Fixed(actual) => Some(actual as usize),
            BufferSize::Default => None,
        };

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());

        let flow_config = FlowConfig {
            channel_count: config.channels as usize,
            sample_rate: config.sample_rate.0 as f32,
            ..requested
        };
        let (producer, consumer) = FlowBuffer::with_observer(flow_config, observer)
            .context("invalid stream configuration")?
            .split();

        let renderer = StreamRenderer {
            block: RenderBlock::new(consumer.channels(), RENDER_BLOCK_FRAMES),
            consumer,
            call_count: 0,
            starved: false,
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(device, config, renderer)?,
            SampleFormat::I16 => build_stream::<i16>(device, config, renderer)?,
            SampleFormat::U16 => build_stream::<u16>(device, config, renderer)?,
            other => anyhow::bail!("unsupported sample format: {:?}", other),
        };

        stream.play().context("failed to start stream")?;

        Ok((
            Self {
                _stream: stream,
                config: AudioHostConfig {
                    flow: flow_config,
                    host_block_frames,
                    device_name,
                    host_name,
                },
            },
            producer,
        ))
    }

    /// Get the audio configuration
    pub fn config(&self) -> &AudioHostConfig {
        &self.config
    }
}

/// Select an output device and configure it
fn select_output_device(
    preferred_host: Option<&str>,
    preferred_rate: u32,
) -> anyhow::Result<(
    cpal::Device,
    StreamConfig,
    SampleFormat,
    String,
    Option<(u32, u32)>,
)> {
    let mut last_error: Option<anyhow::Error> = None;
    let available_hosts = cpal::available_hosts();

    for host in AudioHost::list_hosts() {
        debug!(
            "available host: {} ({:?}){}",
            host.name,
            host.id,
            if host.has_default_device { "" } else { " (no default device)" }
        );
    }

    // Build host priority list: preferred first, then others
    let mut host_priority = Vec::new();
    if let Some(preferred) = preferred_host {
        if let Some(&host_id) = available_hosts.iter().find(|&h| h.name() == preferred) {
            host_priority.push(host_id);
        }
    }
    for host_id in available_hosts {
        if !host_priority.contains(&host_id) {
            host_priority.push(host_id);
        }
    }

    for host_id in host_priority {
        let host = cpal::host_from_id(host_id)?;
        let host_name = host_id.name().to_string();

        let Some(device) = host.default_output_device() else {
            last_error = Some(anyhow::anyhow!(
                "host {} has no default output device",
                host_name
            ));
            continue;
        };

        match device.supported_output_configs() {
            Ok(configs) => {
                for supported in configs {
                    let sample_format = supported.sample_format();

                    if !matches!(
                        sample_format,
                        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                    ) {
                        continue;
                    }

                    if supported.min_sample_rate().0 <= preferred_rate
                        && supported.max_sample_rate().0 >= preferred_rate
                    {
                        let supported_config =
                            supported.with_sample_rate(cpal::SampleRate(preferred_rate));
                        let (buffer_size, range) =
                            choose_buffer_size(supported_config.buffer_size().clone(), &host_name);
                        let mut config = supported_config.config();
                        config.buffer_size = buffer_size;
                        return Ok((device, config, sample_format, host_name, range));
                    }
                }
            }
            Err(err) => {
                last_error = Some(anyhow::anyhow!(
                    "failed to enumerate output configs for host {}: {}",
                    host_name,
                    err
                ));
            }
        }

        // Fall back to default config if preferred sample rate not available
        match device.default_output_config() {
            Ok(supported) => {
                let sample_format = supported.sample_format();
                let (buffer_size, range) =
                    choose_buffer_size(supported.buffer_size().clone(), &host_name);
                let mut config = supported.config();
                config.buffer_size = buffer_size;
                warn!(
                    "{} Hz not available, using device default {} Hz ({:?})",
                    preferred_rate, config.sample_rate.0, sample_format
                );
                return Ok((device, config, sample_format, host_name, range));
            }
            Err(err) => {
                last_error = Some(anyhow::anyhow!(
                    "failed to query default output config for host {}: {}",
                    host_name,
                    err
                ));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no usable output device found")))
}

/// Choose an appropriate buffer size based on device capabilities and host type
fn choose_buffer_size(
    supported: SupportedBufferSize,
    host_name: &str,
) -> (BufferSize, Option<(u32, u32)>) {
    let preferred_host_buffer = match host_name {
        "JACK" => JACK_HOST_BUFFER,
        "ALSA" => ALSA_HOST_BUFFER,
        _ => DEFAULT_HOST_BUFFER,
    };

    match supported {
        // JACK picks its own period and may change it at runtime
        SupportedBufferSize::Range { min, max } if host_name == "JACK" => {
            (BufferSize::Default, Some((min, max)))
        }
        SupportedBufferSize::Range { min, max } => {
            let clamped = (preferred_host_buffer as u32).clamp(min, max);
            (BufferSize::Fixed(clamped), Some((min, max)))
        }
        SupportedBufferSize::Unknown => (BufferSize::Fixed(preferred_host_buffer as u32), None),
    }
}

/// Build an output stream for the given sample type
fn build_stream<T>(
    device: cpal::Device,
    config: StreamConfig,
    mut renderer: StreamRenderer,
) -> anyhow::Result<cpal::Stream>
where
    T: Sample + SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut error_reported = false;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [T], _| {
                if let Err(err) = process_cpal_callback(data, channels, &mut renderer) {
                    if !error_reported {
                        error!("audio callback error: {}", err);
                        error_reported = true;
                    }
                }
            },
            move |err| {
                error!("stream error: {}", err);
            },
            None,
        )
        .context("failed to build stream")?;

    Ok(stream)
}

/// Fill one CPAL callback from the flow buffer.
///
/// The device may ask for any number of frames; each slice of at most
/// `RENDER_BLOCK_FRAMES` frames is one pull from the flow buffer, rendered into the
/// preallocated planar block and then interleaved into the device format.
fn process_cpal_callback<T>(
    output: &mut [T],
    channels: usize,
    renderer: &mut StreamRenderer,
) -> Result<(), &'static str>
where
    T: Sample + FromSample<f32>,
{
    renderer.call_count += 1;

    if channels == 0 {
        return Err("no output channels available");
    }

    if renderer.call_count == 1 {
        debug!(
            "first audio callback: {} samples ({} frames)",
            output.len(),
            output.len() / channels
        );
    }

    if channels != renderer.block.channels() {
        return Err("device channel count changed under the stream");
    }

    if output.len() % channels != 0 {
        return Err("output buffer length not divisible by channel count");
    }

    let max_frames = renderer.block.max_frames();
    for device_block in output.chunks_mut(max_frames * channels) {
        let frames = device_block.len() / channels;
        let exhausted = renderer
            .consumer
            .pull_block(&mut renderer.block, frames)
            .is_exhausted();
        if exhausted && !renderer.starved {
            warn!("flow buffer starved at callback {}", renderer.call_count);
        }
        renderer.starved = exhausted;

        for (frame, out_frame) in device_block.chunks_exact_mut(channels).enumerate() {
            for (channel, sample) in out_frame.iter_mut().enumerate() {
                *sample = T::from_sample(renderer.block.channel(channel)[frame]);
            }
        }
    }

    Ok(())
}

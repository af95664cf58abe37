//! Plays a WAV file (or a test tone) through the default output device, feeding the
//! render callback from a producer thread via the flow buffer.
//!
//! Usage: `stream_player [file.wav] [config.json]`

mod cpal_host;
mod source;

use std::time::Duration;

use anyhow::Context;
use audio_stream::{FlowConfig, StatisticsMailbox};
use cpal_host::AudioHost;
use log::info;
use source::Source;

const STEREO: usize = 2;
const PREFERRED_SAMPLE_RATE: f32 = 48_000.0;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let source = match args.next() {
        Some(path) => Source::Wav(path.into()),
        None => Source::Tone {
            frequency: 440.0,
            amplitude: 0.2,
        },
    };
    let requested = match args.next() {
        Some(path) => FlowConfig::from_json_file(&path)
            .with_context(|| format!("failed to load stream configuration from {}", path))?,
        None => FlowConfig {
            channel_count: STEREO,
            sample_rate: PREFERRED_SAMPLE_RATE,
            ..FlowConfig::default()
        },
    };

    let mailbox = StatisticsMailbox::new();
    let (host, producer) = AudioHost::new(requested, mailbox.clone(), None)?;
    let host_config = host.config();
    let config = host_config.flow;
    info!(
        "playing on host '{}', device '{}': {} Hz, {} channel(s), host block {}",
        host_config.host_name,
        host_config.device_name,
        config.sample_rate,
        config.channel_count,
        host_config
            .host_block_frames
            .map(|frames| frames.to_string())
            .unwrap_or_else(|| "default".to_string())
    );
    info!(
        "buffer: {} frames ({:.0} ms), refill threshold {} frames",
        config.capacity_frames,
        config.render_period(config.capacity_frames).as_secs_f64() * 1000.0,
        config.low_water_frames
    );

    let feeder = source::spawn_feeder(source, producer)?;

    info!("press Ctrl+C to stop");
    let mut last_updates = 0;
    loop {
        std::thread::sleep(Duration::from_secs(1));

        if feeder.is_finished() {
            return match feeder.join() {
                Ok(result) => result,
                Err(_) => anyhow::bail!("feeder thread panicked"),
            };
        }

        let stats = mailbox.latest();
        let updates = mailbox.updates();
        info!(
            "exhausted: {}, full: {}, updates/s: {}",
            stats.exhaust_count,
            stats.full_count,
            updates - last_updates
        );
        last_updates = updates;
    }
}

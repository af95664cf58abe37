/// Map interleaved audio from one channel count to another, appending to `output`.
///
/// Channels present in both layouts are copied, extra source channels are dropped and
/// extra destination channels repeat the last source channel (so mono fans out).
pub fn remap_channels(
    input: &[f32],
    from_channels: usize,
    to_channels: usize,
    output: &mut Vec<f32>,
) {
    debug_assert!(from_channels > 0 && to_channels > 0);

    if from_channels == to_channels {
        output.extend_from_slice(input);
        return;
    }

    output.reserve(input.len() / from_channels * to_channels);
    for frame in input.chunks_exact(from_channels) {
        for channel in 0..to_channels {
            output.push(frame[channel.min(from_channels - 1)]);
        }
    }
}

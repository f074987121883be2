// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Channel extraction, interleaving and the per-channel cleanup passes that
//! run right before PCM encoding.

use rand::Rng;

use super::{ChannelMode, Sample};

/// Extracts a single channel according to `mode`.
/// `Stereo` passes the first source channel through.
pub fn extract_channel(sample: &Sample, mode: ChannelMode) -> Vec<f32> {
    let channels = sample.channels();
    let left = &channels[0];
    let right = channels.get(1).unwrap_or(left);

    match mode {
        ChannelMode::Left | ChannelMode::Stereo => left.clone(),
        ChannelMode::Right => right.clone(),
        ChannelMode::Sum => left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| (l + r) / 2.0)
            .collect(),
        ChannelMode::Difference => left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| (l - r) / 2.0)
            .collect(),
    }
}

/// Maps a sample's channels into the planar output layout for `mode`.
pub fn apply_channel_mode(sample: &Sample, mode: ChannelMode) -> Vec<Vec<f32>> {
    match mode {
        ChannelMode::Stereo => sample.channels().to_vec(),
        _ => vec![extract_channel(sample, mode)],
    }
}

/// Alternates samples LRLR. The shorter channel bounds the output.
pub fn interleave(left: &[f32], right: &[f32]) -> Vec<f32> {
    let mut output = Vec::with_capacity(left.len().min(right.len()) * 2);
    for (l, r) in left.iter().zip(right.iter()) {
        output.push(*l);
        output.push(*r);
    }
    output
}

/// Interleaves any number of equally long planar channels.
pub fn interleave_channels(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [] => Vec::new(),
        [mono] => mono.clone(),
        [left, right] => interleave(left, right),
        _ => {
            let frames = channels[0].len();
            let mut output = Vec::with_capacity(frames * channels.len());
            for frame in 0..frames {
                for channel in channels {
                    output.push(channel[frame]);
                }
            }
            output
        }
    }
}

/// Splits interleaved samples into planar channels. Trailing partial frames are dropped.
pub fn deinterleave(samples: &[f32], channel_count: usize) -> Vec<Vec<f32>> {
    if channel_count == 0 {
        return Vec::new();
    }
    let frames = samples.len() / channel_count;
    let mut planar = vec![Vec::with_capacity(frames); channel_count];
    for frame in samples.chunks_exact(channel_count) {
        for (channel, value) in planar.iter_mut().zip(frame.iter()) {
            channel.push(*value);
        }
    }
    planar
}

/// True when a stereo sample carries the same data on both channels.
pub fn is_dual_mono(sample: &Sample) -> bool {
    match sample.channels() {
        [left, right] => left == right,
        _ => false,
    }
}

/// Smooths isolated spikes: any sample further than `threshold` from the mean
/// of its neighbours is replaced by that mean. A threshold of 0 disables the pass.
pub fn declick(channel: &mut [f32], threshold: f32) {
    if threshold <= 0.0 || channel.len() < 3 {
        return;
    }
    for i in 1..channel.len() - 1 {
        let average = (channel[i - 1] + channel[i + 1]) / 2.0;
        if (channel[i] - average).abs() > threshold {
            channel[i] = average;
        }
    }
}

/// Adds triangular (TPDF) dither of one LSB at `bits` resolution.
pub fn dither<R: Rng + ?Sized>(channel: &mut [f32], bits: u16, rng: &mut R) {
    if bits == 0 || bits >= 32 {
        return;
    }
    let lsb = 1.0 / (1u64 << (bits - 1)) as f32;
    for sample in channel.iter_mut() {
        let noise: f32 = rng.gen::<f32>() - rng.gen::<f32>();
        *sample += noise * lsb;
    }
}

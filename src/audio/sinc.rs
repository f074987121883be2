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
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use super::error::AudioError;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Resamples a whole planar buffer with a band-limited sinc interpolator.
/// The resampler's group delay is trimmed so the output lines up with the input
/// and has `ceil(frames * to / from)` frames.
pub fn resample_sinc(
    channels: &[Vec<f32>],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<f32>>, AudioError> {
    if from_rate == to_rate {
        return Ok(channels.to_vec());
    }
    if from_rate == 0 || to_rate == 0 || channels.is_empty() {
        return Err(AudioError::ResamplingFailed(from_rate, to_rate));
    }

    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let failed = |_e: String| AudioError::ResamplingFailed(from_rate, to_rate);

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, INPUT_BLOCK_SIZE, channels.len())
            .map_err(|e| failed(e.to_string()))?;
    let mut scratch = resampler.output_buffer_allocate(true);

    let frames = channels[0].len();
    let expected = (frames as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels.len()];

    let mut position = 0;
    while frames - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let block: Vec<&[f32]> = channels
            .iter()
            .map(|c| &c[position..position + needed])
            .collect();
        let (consumed, produced) = resampler
            .process_into_buffer(&block, &mut scratch, None)
            .map_err(|e| failed(e.to_string()))?;
        position += consumed;
        push_frames(&mut output, &scratch, produced);
    }

    if position < frames {
        let block: Vec<&[f32]> = channels.iter().map(|c| &c[position..]).collect();
        let (_consumed, produced) = resampler
            .process_partial_into_buffer(Some(block.as_slice()), &mut scratch, None)
            .map_err(|e| failed(e.to_string()))?;
        push_frames(&mut output, &scratch, produced);
    }

    // Flush the filter tail until the delayed signal has fully emerged.
    while output[0].len() < expected + delay {
        let (_consumed, produced) = resampler
            .process_partial_into_buffer(None::<&[Vec<f32>]>, &mut scratch, None)
            .map_err(|e| failed(e.to_string()))?;
        if produced == 0 {
            break;
        }
        push_frames(&mut output, &scratch, produced);
    }

    for channel in output.iter_mut() {
        channel.drain(..delay.min(channel.len()));
        channel.truncate(expected);
    }

    Ok(output)
}

fn push_frames(output: &mut [Vec<f32>], scratch: &[Vec<f32>], frames: usize) {
    for (out, produced) in output.iter_mut().zip(scratch.iter()) {
        out.extend_from_slice(&produced[..frames.min(produced.len())]);
    }
}

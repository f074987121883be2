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

//! Streaming sample-rate converter.
//!
//! Upsampling uses linear interpolation between consecutive input frames.
//! Downsampling uses a multi-tap box filter: every output frame is the
//! weighted mean of all input frames inside its time window. Both paths keep
//! their fractional position between calls, so feeding a buffer in chunks
//! produces the same frames as feeding it at once.

/// Guards the output length estimate against float rounding truncating the
/// final frame.
const OUTPUT_LENGTH_EPSILON: f64 = 1.000000476837158203125;

/// Errors raised by resampler construction and misuse.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ResamplerError {
    #[error("Invalid resampler settings: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Bypass,
    Linear,
    MultiTap,
}

/// A planar resampler. Every channel shares the same position bookkeeping.
#[derive(Debug, Clone)]
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    ratio_weight: f64,
    mode: Mode,
    last_weight: f64,
    last_output: Vec<f64>,
    tail_exists: bool,
}

impl Resampler {
    /// Creates a resampler converting `from_rate` to `to_rate` for `channels` planes.
    pub fn new(from_rate: u32, to_rate: u32, channels: usize) -> Result<Self, ResamplerError> {
        if from_rate == 0 || to_rate == 0 || channels == 0 {
            return Err(ResamplerError::InvalidArgument(format!(
                "from={}Hz to={}Hz channels={}",
                from_rate, to_rate, channels
            )));
        }

        let (mode, ratio_weight, last_weight) = if from_rate == to_rate {
            (Mode::Bypass, 1.0, 0.0)
        } else if from_rate < to_rate {
            (Mode::Linear, from_rate as f64 / to_rate as f64, 1.0)
        } else {
            (Mode::MultiTap, from_rate as f64 / to_rate as f64, 0.0)
        };

        Ok(Resampler {
            from_rate,
            to_rate,
            channels,
            ratio_weight,
            mode,
            last_weight,
            last_output: vec![0.0; channels],
            tail_exists: false,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Upper bound on the frames one call can produce for `input_frames` frames.
    /// The real count is whatever `process` returns; never assume this value.
    pub fn expected_output_len(&self, input_frames: usize) -> usize {
        if self.mode == Mode::Bypass {
            return input_frames;
        }
        let scaled = input_frames as f64 * self.to_rate as f64 / self.from_rate as f64;
        (scaled * OUTPUT_LENGTH_EPSILON).ceil() as usize + 1
    }

    /// Resamples one block of planar input. Carry-over state is kept for the next call.
    pub fn process(&mut self, input: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ResamplerError> {
        if input.len() != self.channels {
            return Err(ResamplerError::InvalidArgument(format!(
                "input has {} channels, expected {}",
                input.len(),
                self.channels
            )));
        }
        let frames = input.first().map(|c| c.len()).unwrap_or(0);
        if input.iter().any(|c| c.len() != frames) {
            return Err(ResamplerError::InvalidArgument(
                "channel buffers differ in length".to_string(),
            ));
        }

        Ok(match self.mode {
            Mode::Bypass => input.to_vec(),
            Mode::Linear => self.linear(input, frames),
            Mode::MultiTap => self.multi_tap(input, frames),
        })
    }

    fn linear(&mut self, input: &[Vec<f32>], frames: usize) -> Vec<Vec<f32>> {
        let capacity = self.expected_output_len(frames);
        let mut output = vec![Vec::with_capacity(capacity); self.channels];
        if frames == 0 {
            return output;
        }

        // Finish interpolating between the previous block's last frame and this block.
        let mut weight = self.last_weight;
        while weight < 1.0 {
            let second = weight % 1.0;
            let first = 1.0 - second;
            for (ch, out) in output.iter_mut().enumerate() {
                let value = self.last_output[ch] * first + input[ch][0] as f64 * second;
                out.push(value as f32);
            }
            weight += self.ratio_weight;
        }
        weight -= 1.0;

        let limit = frames - 1;
        let mut source = weight.floor() as usize;
        while source < limit {
            let second = weight % 1.0;
            let first = 1.0 - second;
            for (ch, out) in output.iter_mut().enumerate() {
                let value =
                    input[ch][source] as f64 * first + input[ch][source + 1] as f64 * second;
                out.push(value as f32);
            }
            weight += self.ratio_weight;
            source = weight.floor() as usize;
        }

        for (ch, last) in self.last_output.iter_mut().enumerate() {
            *last = input[ch].get(source).copied().unwrap_or(input[ch][limit]) as f64;
        }
        self.last_weight = weight % 1.0;

        output
    }

    fn multi_tap(&mut self, input: &[Vec<f32>], frames: usize) -> Vec<Vec<f32>> {
        let capacity = self.expected_output_len(frames);
        let mut output = vec![Vec::with_capacity(capacity); self.channels];
        if frames == 0 {
            return output;
        }

        let mut accumulators = vec![0.0f64; self.channels];
        let mut actual_position = 0usize;
        let mut current_position = 0.0f64;
        let mut already_processed_tail = !self.tail_exists;
        self.tail_exists = false;

        loop {
            let mut weight = if already_processed_tail {
                accumulators.fill(0.0);
                self.ratio_weight
            } else {
                accumulators.copy_from_slice(&self.last_output);
                already_processed_tail = true;
                self.last_weight
            };

            while weight > 0.0 && actual_position < frames {
                let amount_to_next = 1.0 + actual_position as f64 - current_position;
                if weight >= amount_to_next {
                    for (ch, acc) in accumulators.iter_mut().enumerate() {
                        *acc += input[ch][actual_position] as f64 * amount_to_next;
                    }
                    actual_position += 1;
                    current_position = actual_position as f64;
                    weight -= amount_to_next;
                } else {
                    for (ch, acc) in accumulators.iter_mut().enumerate() {
                        *acc += input[ch][actual_position] as f64 * weight;
                    }
                    current_position += weight;
                    weight = 0.0;
                    break;
                }
            }

            if weight <= 0.0 {
                for (out, acc) in output.iter_mut().zip(accumulators.iter()) {
                    out.push((acc / self.ratio_weight) as f32);
                }
            } else {
                // The window straddles the block boundary; finish it next call.
                self.last_weight = weight;
                self.last_output.copy_from_slice(&accumulators);
                self.tail_exists = true;
                break;
            }

            if actual_position >= frames {
                break;
            }
        }

        output
    }
}

/// One-shot mono resample of a full buffer.
pub fn resample(from_rate: u32, to_rate: u32, channel_data: &[f32]) -> Result<Vec<f32>, ResamplerError> {
    if from_rate == to_rate && from_rate > 0 {
        return Ok(channel_data.to_vec());
    }
    let mut resampler = Resampler::new(from_rate, to_rate, 1)?;
    let mut output = resampler.process(&[channel_data.to_vec()])?;
    Ok(output.pop().unwrap_or_default())
}

/// One-shot resample of every channel of a planar buffer.
pub fn resample_channels(
    from_rate: u32,
    to_rate: u32,
    channels: &[Vec<f32>],
) -> Result<Vec<Vec<f32>>, ResamplerError> {
    let mut resampler = Resampler::new(from_rate, to_rate, channels.len())?;
    resampler.process(channels)
}

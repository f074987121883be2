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
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod channels;
pub mod error;
pub mod format;
pub mod host;
pub mod resampler;
pub mod sinc;

pub use error::AudioError;
pub use format::{BitDepth, ChannelMode, TargetFormat};
pub use resampler::{resample, Resampler, ResamplerError};

/// Which converter is used when a sample changes rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleQuality {
    /// Linear upsampling / multi-tap downsampling.
    #[default]
    Fast,
    /// Band-limited sinc interpolation.
    Sinc,
}

/// One decoded audio unit, stored planar at its working rate.
/// All channel buffers always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    source_sample_rate: u32,
    source_bit_depth: u16,
}

impl Sample {
    /// Creates a sample from one or two planar channels.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, AudioError> {
        if channels.is_empty() || channels.len() > 2 {
            return Err(AudioError::InvalidLayout(format!(
                "expected 1 or 2 channels, got {}",
                channels.len()
            )));
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidLayout("sample rate is 0".to_string()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(AudioError::InvalidLayout(
                "channel buffers differ in length".to_string(),
            ));
        }

        Ok(Sample {
            channels,
            sample_rate,
            source_sample_rate: sample_rate,
            source_bit_depth: 32,
        })
    }

    /// Creates a mono sample.
    pub fn mono(data: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        Self::new(vec![data], sample_rate)
    }

    /// Records where the audio originally came from.
    pub fn with_source(mut self, source_sample_rate: u32, source_bit_depth: u16) -> Self {
        self.source_sample_rate = source_sample_rate;
        self.source_bit_depth = source_bit_depth;
        self
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel).
    pub fn len(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn source_bit_depth(&self) -> u16 {
        self.source_bit_depth
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Returns a copy of this sample converted to `sample_rate`.
    /// Provenance fields are carried over unchanged.
    pub fn resampled(&self, sample_rate: u32, quality: ResampleQuality) -> Result<Sample, AudioError> {
        if sample_rate == self.sample_rate {
            return Ok(self.clone());
        }

        debug!(
            from = self.sample_rate,
            to = sample_rate,
            frames = self.len(),
            ?quality,
            "Resampling sample"
        );
        let channels = match quality {
            ResampleQuality::Fast => {
                resampler::resample_channels(self.sample_rate, sample_rate, &self.channels)?
            }
            ResampleQuality::Sinc => {
                sinc::resample_sinc(&self.channels, self.sample_rate, sample_rate)?
            }
        };

        Ok(Sample {
            channels,
            sample_rate,
            source_sample_rate: self.source_sample_rate,
            source_bit_depth: self.source_bit_depth,
        })
    }
}

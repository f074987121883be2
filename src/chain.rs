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
//! Joins several samples into one sample chain with one slice per part.

use tracing::info;

use crate::audio::{AudioError, ResampleQuality, Sample};
use crate::slices::SliceMarker;

/// How parts are laid out in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainOptions {
    /// Pads every part with silence to the length of the longest part, so
    /// slices sit on an even grid.
    pub even_spacing: bool,
    pub quality: ResampleQuality,
}

/// One part of a chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainPart<'a> {
    pub name: &'a str,
    pub sample: &'a Sample,
}

/// Concatenates `parts` at the rate of the first part. The chain is stereo
/// when any part is; mono parts are copied to both sides.
pub fn build_chain(
    parts: &[ChainPart],
    options: &ChainOptions,
) -> Result<(Sample, Vec<SliceMarker>), AudioError> {
    let Some(first) = parts.first() else {
        return Err(AudioError::InvalidLayout("a chain needs at least one part".to_string()));
    };
    let rate = first.sample.sample_rate();
    let channel_count = parts
        .iter()
        .map(|p| p.sample.channel_count())
        .max()
        .unwrap_or(1);

    let converted = parts
        .iter()
        .map(|p| p.sample.resampled(rate, options.quality))
        .collect::<Result<Vec<_>, _>>()?;
    let slot = if options.even_spacing {
        converted.iter().map(|s| s.len()).max().unwrap_or(0)
    } else {
        0
    };

    let mut channels = vec![Vec::new(); channel_count];
    let mut slices = Vec::with_capacity(parts.len());
    for (part, sample) in parts.iter().zip(converted.iter()) {
        let start = channels[0].len();
        for (index, channel) in channels.iter_mut().enumerate() {
            let source = sample
                .channel(index)
                .or_else(|| sample.channel(0))
                .unwrap_or(&[]);
            channel.extend_from_slice(source);
            channel.resize(start + slot.max(source.len()), 0.0);
        }
        let end = channels[0].len();
        if end > start {
            slices.push(SliceMarker::new(start, end).with_name(part.name));
        }
    }

    info!(
        parts = parts.len(),
        frames = channels[0].len(),
        rate,
        even = options.even_spacing,
        "Built sample chain"
    );
    Ok((Sample::new(channels, rate)?, slices))
}

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
//! Polyend Tracker instrument (`.pti`) files: a 392-byte header holding the
//! slice table, followed by 16-bit mono audio at 44.1 kHz.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use super::error::DecodeError;
use super::{ContainerDecoder, ContainerKind, DecodeOptions, Decoded, Metadata, SliceSource};
use crate::audio::Sample;
use crate::slices::{self, SliceMarker};

const FORMAT: &str = "PTI";

const MAGIC: &[u8; 2] = b"TI";
pub const HEADER_SIZE: usize = 392;
pub const PTI_SAMPLE_RATE: u32 = 44100;
pub const MAX_SLICES: usize = 48;

const SAMPLE_LENGTH: usize = 60;
const SLICE_POSITIONS: usize = 280;
const SLICE_COUNT: usize = 376;

/// Slice positions are fractions of the sample length in 1/65535 steps.
const POSITION_SCALE: f64 = 65535.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct PtiDecoder;

impl ContainerDecoder for PtiDecoder {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Pti
    }

    fn matches(&self, bytes: &[u8]) -> bool {
        bytes.len() >= MAGIC.len() && &bytes[..MAGIC.len()] == MAGIC
    }

    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeError> {
        if !self.matches(bytes) {
            return Err(DecodeError::FormatMismatch(FORMAT));
        }
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::malformed(
                FORMAT,
                format!("{} bytes is shorter than the header", bytes.len()),
            ));
        }

        let available = (bytes.len() - HEADER_SIZE) / 2;
        let declared = LittleEndian::read_u32(&bytes[SAMPLE_LENGTH..SAMPLE_LENGTH + 4]) as usize;
        let frames = if declared > 0 {
            declared.min(available)
        } else {
            available
        };
        let data: Vec<f32> = bytes[HEADER_SIZE..HEADER_SIZE + frames * 2]
            .chunks_exact(2)
            .map(|b| LittleEndian::read_i16(b) as f32 / 32768.0)
            .collect();

        let count = (bytes[SLICE_COUNT] as usize).min(MAX_SLICES);
        let mut starts: Vec<usize> = bytes[SLICE_POSITIONS..SLICE_POSITIONS + count * 2]
            .chunks_exact(2)
            .map(|b| {
                let fraction = LittleEndian::read_u16(b) as f64 / POSITION_SCALE;
                (fraction * frames as f64).round() as usize
            })
            .collect();
        starts.sort_unstable();
        starts.dedup();
        let native = slices::from_starts(&starts, frames);
        let slices: Option<Vec<SliceMarker>> = (!native.is_empty()).then(|| {
            slices::rescale_slices(&native, PTI_SAMPLE_RATE, options.working_rate)
        });
        debug!(frames, slices = count, "Decoded PTI instrument");

        let sample = Sample::mono(data, PTI_SAMPLE_RATE)?.with_source(PTI_SAMPLE_RATE, 16);
        let metadata = Metadata {
            slice_source: slices.as_ref().map(|_| SliceSource::PtiHeader),
            ..Metadata::default()
        };
        Decoded::from_native(ContainerKind::Pti, sample, slices, metadata, options)
    }
}

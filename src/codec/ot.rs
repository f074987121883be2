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
//! Elektron Octatrack `.ot` slice files.
//!
//! An `.ot` file is a fixed 832-byte big-endian structure that sits next to a
//! WAV of the same name. Every position in it is a frame offset at 44.1 kHz,
//! whatever the rate of the audio file.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{DecodeError, EncodeError};
use crate::slices::{rescale_position, rescale_slices, SliceMarker};

const FORMAT: &str = "OT";

/// Size of an `.ot` file.
pub const OT_FILE_SIZE: usize = 0x340;

/// Rate all `.ot` positions refer to.
pub const OT_SAMPLE_RATE: u32 = 44100;

/// Slice capacity of an `.ot` file.
pub const MAX_SLICES: usize = 64;

pub const HEADER: [u8; 16] = [
    0x46, 0x4F, 0x52, 0x4D, 0x00, 0x00, 0x00, 0x00, 0x44, 0x50, 0x53, 0x31, 0x53, 0x4D, 0x50, 0x41,
];
const UNKNOWN: [u8; 7] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00];

const UNKNOWN_OFFSET: usize = 0x10;
const TEMPO: usize = 0x17;
const TRIM_LEN: usize = 0x1B;
const LOOP_LEN: usize = 0x1F;
const STRETCH: usize = 0x23;
const LOOP_MODE: usize = 0x27;
const GAIN: usize = 0x2B;
const QUANTIZE: usize = 0x2D;
const TRIM_START: usize = 0x2E;
const TRIM_END: usize = 0x32;
const LOOP_POINT: usize = 0x36;
const SLICES: usize = 0x3A;
const SLICE_SIZE: usize = 12;
const SLICE_COUNT: usize = 0x33A;
// The checksum sums [0x10, 0x33E), which leaves out its own two bytes.
const CHECKSUM: usize = 0x33E;

const NO_LOOP: u32 = 0xFFFF_FFFF;

/// Zero dB as stored in the gain field.
const GAIN_OFFSET: i32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    Normal,
    PingPong,
}

impl LoopMode {
    fn to_raw(self) -> u32 {
        match self {
            LoopMode::Off => 0,
            LoopMode::Normal => 1,
            LoopMode::PingPong => 2,
        }
    }

    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => LoopMode::Normal,
            2 => LoopMode::PingPong,
            _ => LoopMode::Off,
        }
    }
}

/// Timestretch algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stretch {
    Off,
    #[default]
    Normal,
    Beat,
}

impl Stretch {
    fn to_raw(self) -> u32 {
        match self {
            Stretch::Off => 0,
            Stretch::Normal => 2,
            Stretch::Beat => 3,
        }
    }

    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Stretch::Off,
            3 => Stretch::Beat,
            _ => Stretch::Normal,
        }
    }
}

/// Playback settings written into a new `.ot` file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OtSettings {
    pub tempo: f64,
    pub loop_mode: LoopMode,
    pub stretch: Stretch,
    /// Gain in dB, -24 to +24.
    pub gain: i32,
    pub quantize: u8,
}

impl Default for OtSettings {
    fn default() -> Self {
        OtSettings {
            tempo: 120.0,
            loop_mode: LoopMode::Off,
            stretch: Stretch::Normal,
            gain: 0,
            quantize: 0xFF,
        }
    }
}

/// The decoded contents of an `.ot` file. Positions are at 44.1 kHz.
#[derive(Debug, Clone, PartialEq)]
pub struct OtFile {
    pub tempo: f64,
    /// Trim length in hundredths of a bar.
    pub trim_len: u32,
    /// Loop length in hundredths of a bar.
    pub loop_len: u32,
    pub stretch: Stretch,
    pub loop_mode: LoopMode,
    pub gain: i32,
    pub quantize: u8,
    pub trim_start: u32,
    pub trim_end: u32,
    pub loop_point: u32,
    pub slices: Vec<SliceMarker>,
}

impl OtFile {
    /// Describes a sample of `frames` frames at `sample_rate` with the given slices.
    pub fn new(
        frames: usize,
        sample_rate: u32,
        slices: &[SliceMarker],
        settings: &OtSettings,
    ) -> Result<Self, EncodeError> {
        if slices.len() > MAX_SLICES {
            return Err(EncodeError::TooManySlices {
                count: slices.len(),
                limit: MAX_SLICES,
            });
        }

        let reference_frames = rescale_position(frames, sample_rate, OT_SAMPLE_RATE);
        let bars = bar_length(reference_frames, settings.tempo);
        Ok(OtFile {
            tempo: settings.tempo,
            trim_len: bars,
            loop_len: bars,
            stretch: settings.stretch,
            loop_mode: settings.loop_mode,
            gain: settings.gain.clamp(-24, 24),
            quantize: settings.quantize,
            trim_start: 0,
            trim_end: reference_frames as u32,
            loop_point: 0,
            slices: rescale_slices(slices, sample_rate, OT_SAMPLE_RATE),
        })
    }

    pub fn trim_bars(&self) -> f64 {
        self.trim_len as f64 / 100.0
    }

    pub fn loop_bars(&self) -> f64 {
        self.loop_len as f64 / 100.0
    }

    /// The slices positioned at `working_rate`.
    pub fn slices_at(&self, working_rate: u32) -> Vec<SliceMarker> {
        rescale_slices(&self.slices, OT_SAMPLE_RATE, working_rate)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; OT_FILE_SIZE];
        bytes[..HEADER.len()].copy_from_slice(&HEADER);
        bytes[UNKNOWN_OFFSET..UNKNOWN_OFFSET + UNKNOWN.len()].copy_from_slice(&UNKNOWN);

        let mut put = |offset: usize, value: u32| {
            BigEndian::write_u32(&mut bytes[offset..offset + 4], value);
        };
        put(TEMPO, (self.tempo * 24.0).round() as u32);
        put(TRIM_LEN, self.trim_len);
        put(LOOP_LEN, self.loop_len);
        put(STRETCH, self.stretch.to_raw());
        put(LOOP_MODE, self.loop_mode.to_raw());
        put(TRIM_START, self.trim_start);
        put(TRIM_END, self.trim_end);
        put(LOOP_POINT, self.loop_point);
        for (i, slice) in self.slices.iter().take(MAX_SLICES).enumerate() {
            let offset = SLICES + i * SLICE_SIZE;
            put(offset, slice.start as u32);
            put(offset + 4, slice.end as u32);
            put(
                offset + 8,
                slice.loop_point.map(|l| l as u32).unwrap_or(NO_LOOP),
            );
        }
        put(SLICE_COUNT, self.slices.len().min(MAX_SLICES) as u32);

        BigEndian::write_u16(
            &mut bytes[GAIN..GAIN + 2],
            (self.gain + GAIN_OFFSET) as u16,
        );
        bytes[QUANTIZE] = self.quantize;
        let sum = checksum(&bytes);
        BigEndian::write_u16(&mut bytes[CHECKSUM..CHECKSUM + 2], sum);
        bytes
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if !is_ot(bytes) {
            return Err(DecodeError::FormatMismatch(FORMAT));
        }
        if bytes.len() < OT_FILE_SIZE {
            return Err(DecodeError::malformed(
                FORMAT,
                format!("{} bytes, expected {}", bytes.len(), OT_FILE_SIZE),
            ));
        }
        let stored = BigEndian::read_u16(&bytes[CHECKSUM..CHECKSUM + 2]);
        let computed = checksum(&bytes[..OT_FILE_SIZE]);
        if stored != computed {
            // Some tools write a zero checksum; the Octatrack itself only warns.
            debug!(stored, computed, "OT checksum mismatch");
        }

        let get = |offset: usize| BigEndian::read_u32(&bytes[offset..offset + 4]);
        let count = get(SLICE_COUNT) as usize;
        if count > MAX_SLICES {
            return Err(DecodeError::malformed(
                FORMAT,
                format!("slice count {} exceeds {}", count, MAX_SLICES),
            ));
        }
        let slices = (0..count)
            .filter_map(|i| {
                let offset = SLICES + i * SLICE_SIZE;
                let (start, end, loop_point) = (get(offset), get(offset + 4), get(offset + 8));
                (start < end).then(|| SliceMarker {
                    loop_point: (loop_point != NO_LOOP).then_some(loop_point as usize),
                    ..SliceMarker::new(start as usize, end as usize)
                })
            })
            .collect();

        Ok(OtFile {
            tempo: get(TEMPO) as f64 / 24.0,
            trim_len: get(TRIM_LEN),
            loop_len: get(LOOP_LEN),
            stretch: Stretch::from_raw(get(STRETCH)),
            loop_mode: LoopMode::from_raw(get(LOOP_MODE)),
            gain: BigEndian::read_u16(&bytes[GAIN..GAIN + 2]) as i32 - GAIN_OFFSET,
            quantize: bytes[QUANTIZE],
            trim_start: get(TRIM_START),
            trim_end: get(TRIM_END),
            loop_point: get(LOOP_POINT),
            slices,
        })
    }
}

/// Length in hundredths of a bar of `frames` 44.1 kHz frames at `tempo`.
fn bar_length(frames: usize, tempo: f64) -> u32 {
    let beats = frames as f64 / OT_SAMPLE_RATE as f64 * tempo / 60.0;
    (beats / 2.0 * 100.0).round() as u32
}

/// True when `bytes` start with the `.ot` magic.
pub fn is_ot(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER.len() && bytes[..HEADER.len()] == HEADER
}

/// Sum of the bytes after the magic and before the checksum field, modulo 2^16.
pub fn checksum(bytes: &[u8]) -> u16 {
    let end = CHECKSUM.min(bytes.len());
    bytes
        .get(UNKNOWN_OFFSET..end)
        .unwrap_or(&[])
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}

/// Encodes an `.ot` file for `frames` frames at `sample_rate`.
pub fn encode(
    frames: usize,
    sample_rate: u32,
    slices: &[SliceMarker],
    settings: &OtSettings,
) -> Result<Vec<u8>, EncodeError> {
    let file = OtFile::new(frames, sample_rate, slices, settings)?;
    debug!(
        frames,
        sample_rate,
        slices = file.slices.len(),
        bars = file.trim_bars(),
        "Encoded OT"
    );
    Ok(file.to_bytes())
}

/// Decodes the slices of an `.ot` file at `working_rate`.
pub fn decode(bytes: &[u8], working_rate: u32) -> Result<Vec<SliceMarker>, DecodeError> {
    Ok(OtFile::parse(bytes)?.slices_at(working_rate))
}
